// ABOUTME: Port mapping specs in the forms PORT and HOST:CONTAINER.
// ABOUTME: Rejects non-numeric, zero and out-of-range ports at parse time.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortSpecError {
    #[error("port spec cannot be empty")]
    Empty,

    #[error("'{0}' is not a port number")]
    NotNumeric(String),

    #[error("port {0} is outside 1-65535")]
    OutOfRange(String),

    #[error("expected PORT or HOST:CONTAINER")]
    TooManyFields,
}

/// A host port published to a container port.
///
/// Uniqueness of `host_port` is left to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

impl PortMapping {
    pub fn parse(spec: &str) -> Result<Self> {
        Self::parse_inner(spec).map_err(|source| Error::PortSpecInvalid {
            spec: spec.to_string(),
            source,
        })
    }

    fn parse_inner(spec: &str) -> std::result::Result<Self, PortSpecError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(PortSpecError::Empty);
        }

        let mut fields = spec.split(':');
        let host = parse_port(fields.next().unwrap_or_default())?;
        let container = match fields.next() {
            Some(field) => parse_port(field)?,
            None => host,
        };
        if fields.next().is_some() {
            return Err(PortSpecError::TooManyFields);
        }

        Ok(Self {
            host_port: host,
            container_port: container,
        })
    }

    pub fn parse_all<I, S>(specs: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        specs.into_iter().map(|s| Self::parse(s.as_ref())).collect()
    }
}

fn parse_port(field: &str) -> std::result::Result<u16, PortSpecError> {
    let field = field.trim();
    if field.is_empty() {
        return Err(PortSpecError::Empty);
    }
    if !field.chars().all(|c| c.is_ascii_digit()) {
        return Err(PortSpecError::NotNumeric(field.to_string()));
    }
    match field.parse::<u32>() {
        Ok(port @ 1..=65535) => Ok(port as u16),
        _ => Err(PortSpecError::OutOfRange(field.to_string())),
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_port, self.container_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn single_port_maps_to_itself() {
        let port = PortMapping::parse("3000").unwrap();
        assert_eq!(port.host_port, 3000);
        assert_eq!(port.container_port, 3000);
    }

    #[test]
    fn host_and_container_ports() {
        let port = PortMapping::parse("8080:80").unwrap();
        assert_eq!(port.host_port, 8080);
        assert_eq!(port.container_port, 80);
        assert_eq!(port.to_string(), "8080:80");
    }

    #[test]
    fn rejects_malformed_specs() {
        for spec in ["", "abc", "0", "65536", "80:", ":80", "1:2:3", "-1", "99999999999"] {
            let err = PortMapping::parse(spec).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PortSpecInvalid, "spec {spec:?}");
        }
    }

    #[test]
    fn reports_the_specific_problem() {
        assert_eq!(
            PortMapping::parse_inner("http"),
            Err(PortSpecError::NotNumeric("http".into()))
        );
        assert_eq!(
            PortMapping::parse_inner("70000"),
            Err(PortSpecError::OutOfRange("70000".into()))
        );
        assert_eq!(
            PortMapping::parse_inner("1:2:3"),
            Err(PortSpecError::TooManyFields)
        );
    }

    #[test]
    fn parse_all_stops_at_first_error() {
        assert_eq!(PortMapping::parse_all(["80", "443:8443"]).unwrap().len(), 2);
        assert!(PortMapping::parse_all(["80", "nope"]).is_err());
    }
}
