//! Caller-supplied targets, dispatched once at the boundary.
//!
//! A caller may hand the workflow either instance names or database handles
//! obtained elsewhere (or a mix). Everything is reduced here to one primary
//! instance and an ordered, de-duplicated list of database names, so the rest
//! of the workflow never inspects input kinds again.

use serde::{Deserialize, Serialize};

use crate::error::{AgJoinError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerInput {
    Instance { name: String },
    Database { instance: String, database: String },
    Login { instance: String, login: String },
}

impl ServerInput {
    pub fn instance(name: impl Into<String>) -> Self {
        Self::Instance { name: name.into() }
    }

    pub fn database(instance: impl Into<String>, database: impl Into<String>) -> Self {
        Self::Database {
            instance: instance.into(),
            database: database.into(),
        }
    }

    fn instance_name(&self) -> &str {
        match self {
            Self::Instance { name } => name,
            Self::Database { instance, .. } | Self::Login { instance, .. } => instance,
        }
    }
}

/// Primary instance and the databases to add, in caller order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub primary: String,
    pub databases: Vec<String>,
}

pub fn resolve_inputs(inputs: &[ServerInput], databases: &[String]) -> Result<ResolvedTargets> {
    let mut primary: Option<&str> = None;
    let mut resolved: Vec<String> = Vec::new();

    for input in inputs {
        if let ServerInput::Login { login, .. } = input {
            return Err(AgJoinError::UnsupportedInput(format!(
                "login {login} cannot be added to an availability group; pass an instance or database"
            )));
        }

        let instance = input.instance_name();
        match primary {
            Some(existing) if !existing.eq_ignore_ascii_case(instance) => {
                return Err(AgJoinError::UnsupportedInput(format!(
                    "all inputs must target the same primary instance, got {existing} and {instance}"
                )));
            }
            Some(_) => {}
            None => primary = Some(instance),
        }

        if let ServerInput::Database { database, .. } = input {
            push_unique(&mut resolved, database);
        }
    }

    for name in databases {
        push_unique(&mut resolved, name);
    }

    let primary = primary
        .ok_or_else(|| AgJoinError::UnsupportedInput("no primary instance supplied".to_string()))?
        .to_string();

    if resolved.is_empty() {
        return Err(AgJoinError::UnsupportedInput(
            "no databases supplied".to_string(),
        ));
    }

    Ok(ResolvedTargets {
        primary,
        databases: resolved,
    })
}

fn push_unique(resolved: &mut Vec<String>, name: &str) {
    if !resolved.iter().any(|existing| existing.eq_ignore_ascii_case(name)) {
        resolved.push(name.to_string());
    }
}
