use rand::Rng;

const TOKEN_LENGTH: usize = 25;

/// Random alphanumeric token used in confirmation and unsubscribe links.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(String);

impl SubscriptionToken {
    pub fn generate() -> SubscriptionToken {
        let mut rng = rand::thread_rng();
        let token = std::iter::repeat_with(|| rng.sample(rand::distributions::Alphanumeric))
            .map(char::from)
            .take(TOKEN_LENGTH)
            .collect();

        Self(token)
    }

    /// Checks the shape of a token coming from a link, so malformed input
    /// never reaches the store.
    pub fn parse(token: String) -> Result<SubscriptionToken, String> {
        let is_valid = token.len() == TOKEN_LENGTH && token.chars().all(|c| c.is_ascii_alphanumeric());

        if !is_valid {
            return Err(format!("{} is not a valid subscription token", token));
        }

        Ok(Self(token))
    }
}

impl AsRef<str> for SubscriptionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
