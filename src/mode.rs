use serde::{Deserialize, Serialize};

/// Which generation capability a submit is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Chat,
    Image,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Image => "image",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" | "text" => Some(Mode::Chat),
            "image" | "imagen" => Some(Mode::Image),
            _ => None,
        }
    }

    pub fn all() -> Vec<Mode> {
        vec![Mode::Chat, Mode::Image]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Chat => "Chat",
            Mode::Image => "Image",
        }
    }

    pub fn toggled(&self) -> Mode {
        match self {
            Mode::Chat => Mode::Image,
            Mode::Image => Mode::Chat,
        }
    }

    /// Hint shown in the empty input box.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Mode::Chat => "Message Gemini...",
            Mode::Image => "Enter a prompt to generate an image...",
        }
    }

    pub fn action_label(&self) -> &'static str {
        match self {
            Mode::Chat => "Send",
            Mode::Image => "Generate",
        }
    }

    /// Only chat requests can carry an attached image.
    pub fn accepts_attachments(&self) -> bool {
        matches!(self, Mode::Chat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!(Mode::from_str("Chat"), Some(Mode::Chat));
        assert_eq!(Mode::from_str(" IMAGE "), Some(Mode::Image));
        assert_eq!(Mode::from_str("video"), None);
    }

    #[test]
    fn test_as_str_round_trips() {
        for mode in Mode::all() {
            assert_eq!(Mode::from_str(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn test_toggled() {
        assert_eq!(Mode::Chat.toggled(), Mode::Image);
        assert_eq!(Mode::Image.toggled(), Mode::Chat);
    }

    #[test]
    fn test_affordances_follow_mode() {
        assert_eq!(Mode::Chat.action_label(), "Send");
        assert_eq!(Mode::Image.action_label(), "Generate");
        assert!(Mode::Chat.accepts_attachments());
        assert!(!Mode::Image.accepts_attachments());
    }
}
