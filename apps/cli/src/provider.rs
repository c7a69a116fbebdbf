/// Chat-completions backends questions can be generated with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provider {
    #[default]
    Grok,
    Openai,
    Gemini,
}

pub struct Endpoint {
    pub url: &'static str,
    pub model: &'static str,
}

#[derive(Debug, thiserror::Error)]
#[error("{provider} needs an API key: set the {env_var} environment variable")]
pub struct MissingApiKey {
    pub provider: &'static str,
    pub env_var: &'static str,
}

impl Provider {
    pub fn endpoint(self) -> Endpoint {
        match self {
            Provider::Grok => Endpoint {
                url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
            },
            Provider::Openai => Endpoint {
                url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-5.1",
            },
            Provider::Gemini => Endpoint {
                url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-3-pro",
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Provider::Grok => "Grok",
            Provider::Openai => "OpenAI",
            Provider::Gemini => "Gemini",
        }
    }

    pub fn key_var(self) -> &'static str {
        match self {
            Provider::Grok => "XAI_API_KEY",
            Provider::Openai => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn api_key(self) -> Result<String, MissingApiKey> {
        self.api_key_from(|var| std::env::var(var).ok())
    }

    /// Blank keys count as missing.
    fn api_key_from(
        self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String, MissingApiKey> {
        lookup(self.key_var())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(MissingApiKey {
                provider: self.name(),
                env_var: self.key_var(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_read_from_the_provider_variable() {
        let key = Provider::Openai
            .api_key_from(|var| (var == "OPENAI_API_KEY").then(|| " sk-test \n".to_string()))
            .unwrap();
        assert_eq!(key, "sk-test");
    }

    #[test]
    fn blank_or_missing_key_names_the_variable() {
        let err = Provider::Gemini
            .api_key_from(|_| Some("   ".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let err = Provider::Grok.api_key_from(|_| None).unwrap_err();
        assert_eq!(err.provider, "Grok");
    }
}
