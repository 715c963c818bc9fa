use serde::{Deserialize, Serialize};

/// A named parameter value carried by a task (input or output)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub value: Option<String>,
}

impl Variable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

/// Insert or overwrite `key` in a variable list, keeping insertion order
pub(crate) fn upsert(variables: &mut Vec<Variable>, key: &str, value: Option<String>) {
    match variables.iter_mut().find(|v| v.key == key) {
        Some(existing) => existing.value = value,
        None => variables.push(Variable {
            key: key.to_string(),
            value,
        }),
    }
}

/// Look up the value bound to `key`
pub(crate) fn lookup<'a>(variables: &'a [Variable], key: &str) -> Option<&'a str> {
    variables
        .iter()
        .find(|v| v.key == key)
        .and_then(|v| v.value.as_deref())
}
