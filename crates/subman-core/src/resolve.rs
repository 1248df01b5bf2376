use std::collections::BTreeMap;

/// Registered commands keyed by their canonical, space-joined name.
#[derive(Debug)]
pub struct CommandTable<T> {
    commands: BTreeMap<String, T>,
}

/// A successful resolution.
#[derive(Debug)]
pub struct Resolved<'a, T> {
    pub name: &'a str,
    pub command: &'a T,
    /// How many positional tokens the name used up.
    pub consumed: usize,
}

impl<T> Default for CommandTable<T> {
    fn default() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }
}

impl<T> CommandTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `command` under `name`. Whitespace in `name` is normalized to single spaces.
    pub fn insert(&mut self, name: &str, command: T) -> Option<T> {
        let key = name.split_whitespace().collect::<Vec<_>>().join(" ");
        self.commands.insert(key, command)
    }

    /// Commands in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.commands.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Find the longest registered prefix of the positional tokens.
    ///
    /// Tokens starting with `-` are ignored. The whole positional sequence is
    /// tried first, then shorter prefixes, dropping one trailing token at a time.
    pub fn resolve<S: AsRef<str>>(&self, tokens: &[S]) -> Option<Resolved<'_, T>> {
        let positional = positional_tokens(tokens);

        (1..=positional.len()).rev().find_map(|len| {
            let key = positional[..len].join(" ");
            self.commands
                .get_key_value(key.as_str())
                .map(|(name, command)| Resolved {
                    name: name.as_str(),
                    command,
                    consumed: len,
                })
        })
    }
}

/// Tokens that do not look like options, in order.
pub fn positional_tokens<S: AsRef<str>>(tokens: &[S]) -> Vec<&str> {
    tokens
        .iter()
        .map(AsRef::as_ref)
        .filter(|t| !t.starts_with('-'))
        .collect()
}

/// Remove the first `consumed` positional tokens, keeping everything else in order.
pub fn strip_command_tokens<S: AsRef<str>>(tokens: &[S], consumed: usize) -> Vec<String> {
    let mut remaining = consumed;
    tokens
        .iter()
        .map(AsRef::as_ref)
        .filter(|t| {
            if remaining > 0 && !t.starts_with('-') {
                remaining -= 1;
                false
            } else {
                true
            }
        })
        .map(str::to_string)
        .collect()
}
