use colored::Color;
use serde::{Deserialize, Serialize};

/// Two-state colour scheme. Toggled in memory; the settings value only seeds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// Terminal colours for one theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub accent: Color,
    pub user: Color,
    pub assistant: Color,
    pub error: Color,
    pub muted: Color,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            Self::Dark => Palette {
                accent: Color::BrightBlue,
                user: Color::BrightWhite,
                assistant: Color::BrightCyan,
                error: Color::BrightRed,
                muted: Color::BrightBlack,
            },
            Self::Light => Palette {
                accent: Color::Blue,
                user: Color::Black,
                assistant: Color::Magenta,
                error: Color::Red,
                muted: Color::BrightBlack,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_twice_returns_to_the_start() {
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
        assert_eq!(Theme::Dark.toggled().toggled(), Theme::Dark);
    }

    #[test]
    fn error_colour_is_red_in_both_themes() {
        assert_eq!(Theme::Dark.palette().error, Color::BrightRed);
        assert_eq!(Theme::Light.palette().error, Color::Red);
    }
}
