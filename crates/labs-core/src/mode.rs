use serde::{Deserialize, Serialize};

/// A generation modality a widget can be switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Chat,
    Image,
    Background,
    Video,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Image => "image",
            Mode::Background => "background",
            Mode::Video => "video",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Some(Mode::Chat),
            "image" => Some(Mode::Image),
            "background" | "bg" => Some(Mode::Background),
            "video" => Some(Mode::Video),
            _ => None,
        }
    }

    pub fn all() -> Vec<Mode> {
        vec![Mode::Chat, Mode::Image, Mode::Video, Mode::Background]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Chat => "Chat",
            Mode::Image => "Image",
            Mode::Background => "BG Gen",
            Mode::Video => "Video",
        }
    }

    /// Image and video models need a user-selected credential before each call.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, Mode::Chat)
    }

    /// Output size for the image-producing modes.
    pub fn image_size(&self) -> Option<ImageSize> {
        match self {
            Mode::Image => Some(ImageSize::OneK),
            Mode::Background => Some(ImageSize::FourK),
            Mode::Chat | Mode::Video => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }
}
