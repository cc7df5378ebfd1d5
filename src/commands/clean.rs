// ABOUTME: Clean command implementation.
// ABOUTME: Removes every image boxctl built, named configurations included.

use super::Context;
use super::runtime_connection::connect_to_runtime;
use boxctl::error::Result;
use boxctl::image::is_box_image;
use boxctl::output::Output;
use boxctl::runtime::{ImageError, ImageOps};
use boxctl::types::BOX_IMAGE_PREFIX;

pub async fn clean(ctx: &Context, mut output: Output) -> Result<()> {
    output.start_timer();
    let runtime = connect_to_runtime(ctx, &output).await?;

    let mut tags: Vec<String> = runtime
        .list_image_tags(BOX_IMAGE_PREFIX)
        .await?
        .into_iter()
        .filter(|tag| is_box_image(tag))
        .collect();
    tags.sort();

    if tags.is_empty() {
        output.success("No box images to remove");
        return Ok(());
    }

    let mut removed = 0;
    for tag in &tags {
        output.progress(&format!("  → Removing {tag}"));
        match runtime.remove_image(tag, true).await {
            Ok(()) => removed += 1,
            // several tags may point at one image
            Err(ImageError::NotFound(_)) => removed += 1,
            Err(e) => output.error(&e.to_string()),
        }
    }

    output.success(&format!("Removed {removed} of {} box image(s)", tags.len()));
    Ok(())
}
