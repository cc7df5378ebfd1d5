// ABOUTME: Configs command implementation.
// ABOUTME: Lists, shows and deletes named configurations in the store.

use super::Context;
use crate::cli::ConfigsAction;
use boxctl::error::Result;
use boxctl::output::Output;

pub fn configs(ctx: &Context, action: ConfigsAction, output: Output) -> Result<()> {
    let store = ctx.store();

    match action {
        ConfigsAction::List => {
            let names = store.list()?;
            let text = if names.is_empty() {
                "No saved configurations.".to_string()
            } else {
                names.join("\n")
            };
            output.data(&names, &text);
        }
        ConfigsAction::Show { name } => {
            let config = store.load(&name)?;
            let text = serde_json::to_string_pretty(&config)?;
            output.data(&config, &text);
        }
        ConfigsAction::Delete { name } => {
            store.delete(&name)?;
            output.success(&format!("Deleted configuration '{name}'"));
        }
    }

    Ok(())
}
