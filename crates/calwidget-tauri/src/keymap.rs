use calwidget_core::Navigation;

/// What a key press does in the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Navigate(Navigation),
    Refresh,
    Close,
}

impl KeyAction {
    /// Maps a DOM `KeyboardEvent.key` value to an action.
    ///
    /// Letter keys ignore case; modifiers other than Ctrl are not considered.
    pub fn from_key(key: &str, ctrl: bool) -> Option<Self> {
        if ctrl {
            return key.eq_ignore_ascii_case("q").then_some(Self::Close);
        }
        match key {
            "ArrowLeft" => Some(Self::Navigate(Navigation::Previous)),
            "ArrowRight" => Some(Self::Navigate(Navigation::Next)),
            "Home" => Some(Self::Navigate(Navigation::Today)),
            "F5" => Some(Self::Refresh),
            "Escape" => Some(Self::Close),
            key if key.eq_ignore_ascii_case("t") => Some(Self::Navigate(Navigation::Today)),
            key if key.eq_ignore_ascii_case("r") => Some(Self::Refresh),
            _ => None,
        }
    }
}
