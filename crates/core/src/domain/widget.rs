pub const DEFAULT_PRIMARY_COLOR: &str = "#007bff";
pub const DEFAULT_WELCOME_MESSAGE: &str = "Hello! How can I help you today?";

/// Visual theme requested by the embedding page. Unknown values fall back
/// to the default instead of failing the render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WidgetTheme {
    #[default]
    Light,
    Dark,
    Auto,
}

impl WidgetTheme {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Auto => "auto",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WidgetPosition {
    #[default]
    BottomRight,
    BottomLeft,
}

impl WidgetPosition {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bottom-right" => Some(Self::BottomRight),
            "bottom-left" => Some(Self::BottomLeft),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BottomRight => "bottom-right",
            Self::BottomLeft => "bottom-left",
        }
    }

    /// CSS side the bubble and popup anchor to.
    pub fn css_side(&self) -> &'static str {
        match self {
            Self::BottomRight => "right",
            Self::BottomLeft => "left",
        }
    }
}
