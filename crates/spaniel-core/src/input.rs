//! Synthetic input injection.
//!
//! [`InputInjector`] is the host-provided collaborator that fakes mouse and
//! keyboard events at absolute screen coordinates. [`Input`] wraps it with the
//! argument validation every caller needs: negative coordinates and unknown
//! key names are rejected before anything reaches the display server.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, SpanielError};

/// Host-provided synthetic input backend.
///
/// Coordinates are integer screen pixels and are already validated as
/// non-negative when they reach an implementation through [`Input`].
#[async_trait]
pub trait InputInjector: Send + Sync {
    async fn absolute_motion(&self, x: i32, y: i32) -> Result<()>;

    async fn relative_motion(&self, dx: i32, dy: i32) -> Result<()>;

    async fn press(&self, x: i32, y: i32, button: u32) -> Result<()>;

    async fn release(&self, x: i32, y: i32, button: u32) -> Result<()>;

    async fn click(&self, x: i32, y: i32, button: u32) -> Result<()>;

    async fn double_click(&self, x: i32, y: i32, button: u32) -> Result<()>;

    /// Types a string into whatever has keyboard focus.
    async fn type_string(&self, text: &str) -> Result<()>;

    /// Presses and releases a parsed key combination.
    async fn key_combo(&self, combo: &KeyCombo) -> Result<()>;

    /// Presses and releases a single key by keysym name.
    async fn press_key(&self, keysym: &str) -> Result<()>;
}

/// Keyboard modifiers usable in a key combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Control,
    Shift,
    Alt,
    Super,
}

impl Modifier {
    fn parse(name: &str) -> Option<Modifier> {
        match name.to_ascii_lowercase().as_str() {
            "ctrl" | "control" | "primary" => Some(Modifier::Control),
            "shift" => Some(Modifier::Shift),
            "alt" | "mod1" | "meta" => Some(Modifier::Alt),
            "super" | "win" | "mod4" => Some(Modifier::Super),
            _ => None,
        }
    }

    /// The keysym of the left-hand key for this modifier.
    pub fn keysym(self) -> &'static str {
        match self {
            Modifier::Control => "Control_L",
            Modifier::Shift => "Shift_L",
            Modifier::Alt => "Alt_L",
            Modifier::Super => "Super_L",
        }
    }
}

/// A key combination such as `<Control><Shift>s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    pub modifiers: Vec<Modifier>,
    /// Canonical keysym name of the final key.
    pub key: String,
}

impl KeyCombo {
    /// Parses `<Mod>...key` notation. Modifier and key names are case-insensitive.
    ///
    /// ```
    /// use spaniel_core::input::{KeyCombo, Modifier};
    ///
    /// let combo = KeyCombo::parse("<Ctrl><Shift>s").unwrap();
    /// assert_eq!(combo.modifiers, vec![Modifier::Control, Modifier::Shift]);
    /// assert_eq!(combo.key, "s");
    /// ```
    pub fn parse(spec: &str) -> Result<KeyCombo> {
        let mut rest = spec.trim();
        let mut modifiers = Vec::new();
        while let Some(stripped) = rest.strip_prefix('<') {
            let end = stripped.find('>').ok_or_else(|| {
                SpanielError::InvalidArgument(format!("unterminated modifier in key combo '{}'", spec))
            })?;
            let name = &stripped[..end];
            let modifier = Modifier::parse(name).ok_or_else(|| {
                SpanielError::InvalidArgument(format!("unknown modifier '{}' in key combo '{}'", name, spec))
            })?;
            if !modifiers.contains(&modifier) {
                modifiers.push(modifier);
            }
            rest = &stripped[end + 1..];
        }
        if rest.is_empty() {
            return Err(SpanielError::InvalidArgument(format!(
                "key combo '{}' has no key",
                spec
            )));
        }
        Ok(KeyCombo {
            modifiers,
            key: keysym_for(rest)?,
        })
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            let name = match m {
                Modifier::Control => "Control",
                Modifier::Shift => "Shift",
                Modifier::Alt => "Alt",
                Modifier::Super => "Super",
            };
            write!(f, "<{}>", name)?;
        }
        f.write_str(&self.key)
    }
}

const KEYSYMS: &[&str] = &[
    "Return", "Escape", "Tab", "ISO_Left_Tab", "BackSpace", "Delete", "Insert", "Home", "End",
    "Page_Up", "Page_Down", "Left", "Right", "Up", "Down", "space", "Menu", "Print", "Pause",
    "Caps_Lock", "Num_Lock", "Scroll_Lock", "KP_Enter", "Control_L", "Control_R", "Shift_L",
    "Shift_R", "Alt_L", "Alt_R", "Super_L", "Super_R",
];

/// Resolves a key name or alias to its canonical keysym.
///
/// Single characters map to themselves; `F1`..`F35` and the common named keys
/// are accepted case-insensitively, along with aliases such as `enter`, `esc`
/// and `pgup`.
pub fn keysym_for(name: &str) -> Result<String> {
    if name.chars().count() == 1 {
        return Ok(name.to_string());
    }
    let lower = name.to_ascii_lowercase();
    let alias = match lower.as_str() {
        "enter" | "return" => Some("Return"),
        "esc" | "escape" => Some("Escape"),
        "backspace" => Some("BackSpace"),
        "del" | "delete" => Some("Delete"),
        "ins" => Some("Insert"),
        "pgup" | "pageup" | "prior" => Some("Page_Up"),
        "pgdn" | "pagedown" | "next" => Some("Page_Down"),
        "spacebar" => Some("space"),
        _ => None,
    };
    if let Some(sym) = alias {
        return Ok(sym.to_string());
    }
    if let Some(sym) = KEYSYMS.iter().find(|k| k.eq_ignore_ascii_case(name)) {
        return Ok(sym.to_string());
    }
    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u32>().ok()) {
        if (1..=35).contains(&n) {
            return Ok(format!("F{}", n));
        }
    }
    Err(SpanielError::InvalidArgument(format!("unknown key name '{}'", name)))
}

fn check_point(x: i32, y: i32) -> Result<()> {
    if x < 0 || y < 0 {
        return Err(SpanielError::InvalidArgument(format!(
            "invalid coordinate ({}, {})",
            x, y
        )));
    }
    Ok(())
}

fn check_button(button: u32) -> Result<()> {
    if !(1..=5).contains(&button) {
        return Err(SpanielError::InvalidArgument(format!(
            "invalid mouse button {}",
            button
        )));
    }
    Ok(())
}

/// Validating front-end over an [`InputInjector`].
#[derive(Clone)]
pub struct Input {
    injector: Arc<dyn InputInjector>,
}

impl Input {
    pub fn new(injector: Arc<dyn InputInjector>) -> Self {
        Self { injector }
    }

    pub fn injector(&self) -> &Arc<dyn InputInjector> {
        &self.injector
    }

    pub async fn absolute_motion(&self, x: i32, y: i32) -> Result<()> {
        check_point(x, y)?;
        self.injector.absolute_motion(x, y).await
    }

    pub async fn relative_motion(&self, dx: i32, dy: i32) -> Result<()> {
        self.injector.relative_motion(dx, dy).await
    }

    pub async fn press(&self, x: i32, y: i32, button: u32) -> Result<()> {
        check_point(x, y)?;
        check_button(button)?;
        self.injector.press(x, y, button).await
    }

    pub async fn release(&self, x: i32, y: i32, button: u32) -> Result<()> {
        check_point(x, y)?;
        check_button(button)?;
        self.injector.release(x, y, button).await
    }

    pub async fn click(&self, x: i32, y: i32, button: u32) -> Result<()> {
        check_point(x, y)?;
        check_button(button)?;
        debug!(x, y, button, "raw click");
        self.injector.click(x, y, button).await
    }

    pub async fn double_click(&self, x: i32, y: i32, button: u32) -> Result<()> {
        check_point(x, y)?;
        check_button(button)?;
        debug!(x, y, button, "raw double click");
        self.injector.double_click(x, y, button).await
    }

    /// Types a single character into whatever has keyboard focus.
    pub async fn type_char(&self, c: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.injector.type_string(c.encode_utf8(&mut buf)).await
    }

    /// Parses and sends a key combination.
    pub async fn key_combo(&self, spec: &str) -> Result<()> {
        let combo = KeyCombo::parse(spec)?;
        debug!(combo = %combo, "key combo");
        self.injector.key_combo(&combo).await
    }

    /// Presses a single named key.
    pub async fn press_key(&self, name: &str) -> Result<()> {
        let keysym = keysym_for(name)?;
        self.injector.press_key(&keysym).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InputEvent, RecordingInput};

    #[test]
    fn parses_key_combos() {
        let combo = KeyCombo::parse("<Control><Alt>Delete").unwrap();
        assert_eq!(combo.modifiers, vec![Modifier::Control, Modifier::Alt]);
        assert_eq!(combo.key, "Delete");

        let combo = KeyCombo::parse("<ctrl>q").unwrap();
        assert_eq!(combo.to_string(), "<Control>q");

        assert_eq!(KeyCombo::parse("enter").unwrap().key, "Return");
        assert_eq!(KeyCombo::parse("<Alt>f4").unwrap().key, "F4");
    }

    #[test]
    fn rejects_bad_key_combos() {
        for bad in ["<Hyperdrive>a", "<Control>", "<Control", "NoSuchKey", "F99", ""] {
            assert!(
                matches!(KeyCombo::parse(bad), Err(SpanielError::InvalidArgument(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn keysym_aliases() {
        assert_eq!(keysym_for("esc").unwrap(), "Escape");
        assert_eq!(keysym_for("PGDN").unwrap(), "Page_Down");
        assert_eq!(keysym_for("backspace").unwrap(), "BackSpace");
        assert_eq!(keysym_for("ü").unwrap(), "ü");
    }

    #[tokio::test]
    async fn negative_coordinates_are_rejected() {
        let recorder = Arc::new(RecordingInput::new());
        let input = Input::new(recorder.clone());
        let err = input.click(-1, 10, 1).await.unwrap_err();
        assert!(err.to_string().contains("invalid coordinate"));
        assert!(input.press(5, -5, 1).await.is_err());
        assert!(input.absolute_motion(-3, 0).await.is_err());
        assert!(recorder.events().is_empty(), "nothing may reach the injector");
    }

    #[tokio::test]
    async fn invalid_buttons_are_rejected() {
        let recorder = Arc::new(RecordingInput::new());
        let input = Input::new(recorder.clone());
        assert!(input.click(1, 1, 0).await.is_err());
        assert!(input.click(1, 1, 9).await.is_err());
        input.click(1, 1, 3).await.unwrap();
        assert_eq!(recorder.events(), vec![InputEvent::Click { x: 1, y: 1, button: 3 }]);
    }

    #[tokio::test]
    async fn type_char_sends_multibyte_characters() {
        let recorder = Arc::new(RecordingInput::new());
        let input = Input::new(recorder.clone());
        for c in "hé!".chars() {
            input.type_char(c).await.unwrap();
        }
        assert_eq!(recorder.typed(), "hé!");
        assert_eq!(recorder.events().len(), 3);
    }
}
