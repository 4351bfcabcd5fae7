mod input;
mod render;
mod terminal;
mod theme;

pub use input::{InputCommand, parse_input};
pub use render::{
    LOADING_INDICATOR, SidebarEntry, WELCOME_TEXT, render_help, render_message, render_sidebar,
    render_transcript,
};
pub use terminal::{run_session, run_terminal};
pub use theme::{Palette, Theme};
