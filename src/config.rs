use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub fn key_match(key: &KeyEvent, bindings: &[String]) -> bool {
    bindings.iter().any(|binding| is_match(key, binding))
}

fn is_match(key: &KeyEvent, binding: &str) -> bool {
    let binding = binding.to_lowercase();
    let mut target_modifiers = KeyModifiers::NONE;
    let mut target_code = KeyCode::Null;

    for part in binding.split('+') {
        match part {
            "ctrl" => target_modifiers.insert(KeyModifiers::CONTROL),
            "opt" | "alt" => target_modifiers.insert(KeyModifiers::ALT),
            "shift" => target_modifiers.insert(KeyModifiers::SHIFT),
            "enter" => target_code = KeyCode::Enter,
            "esc" => target_code = KeyCode::Esc,
            "backspace" => target_code = KeyCode::Backspace,
            "tab" => target_code = KeyCode::Tab,
            "backtab" => target_code = KeyCode::BackTab,
            "space" => target_code = KeyCode::Char(' '),
            "up" => target_code = KeyCode::Up,
            "down" => target_code = KeyCode::Down,
            "left" => target_code = KeyCode::Left,
            "right" => target_code = KeyCode::Right,
            "delete" => target_code = KeyCode::Delete,
            c if c.chars().count() == 1 => {
                if let Some(ch) = c.chars().next() {
                    target_code = KeyCode::Char(ch);
                }
            }
            _ => {}
        }
    }

    let code_matches = if key.code == target_code {
        true
    } else if let (KeyCode::Char(c), KeyCode::Char(tc)) = (key.code, target_code) {
        c.to_lowercase().next() == Some(tc)
    } else {
        false
    };
    if !code_matches {
        return false;
    }

    // Shift is implied by the character itself unless the binding asks for it.
    let mut key_mods = key.modifiers;
    if !target_modifiers.contains(KeyModifiers::SHIFT) {
        key_mods.remove(KeyModifiers::SHIFT);
    }
    key_mods == target_modifiers
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "meghendra", "todopad")
}

fn default_data_dir() -> PathBuf {
    if let Some(path) = std::env::var_os("TODOPAD_DATA_DIR") {
        return PathBuf::from(path);
    }
    if let Some(dirs) = project_dirs() {
        return dirs.data_dir().to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".todopad")
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("TODOPAD_CONFIG") {
        return PathBuf::from(path);
    }
    if let Some(dirs) = project_dirs() {
        return dirs.config_dir().join("config.toml");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".todopad-config.toml")
}

/// Location of the persisted credential: one file holding the raw token
/// string and nothing else.
pub fn token_path(config: &Config) -> PathBuf {
    config.data.dir.join("token")
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub data: DataConfig,
    pub keybindings: KeyBindings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the todo service, e.g. "https://api.example.com/prod".
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// Hosted UI domain of the identity provider, e.g.
    /// "https://example.auth.us-east-1.amazoncognito.com".
    pub domain: String,
    pub client_id: String,
    /// Must be a loopback address registered with the provider; the redirect
    /// listener binds to its host and port.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Post-logout redirect target; falls back to redirect_uri when empty.
    pub logout_uri: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            client_id: String::new(),
            redirect_uri: "http://localhost:53682/".to_string(),
            scopes: vec![
                "email".to_string(),
                "openid".to_string(),
                "phone".to_string(),
            ],
            logout_uri: String::new(),
        }
    }
}

impl AuthConfig {
    pub fn logout_target(&self) -> &str {
        if self.logout_uri.trim().is_empty() {
            &self.redirect_uri
        } else {
            &self.logout_uri
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.domain.trim().is_empty() && !self.client_id.trim().is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KeyBindings {
    pub global: GlobalBindings,
    pub list: ListBindings,
    pub form: FormBindings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GlobalBindings {
    pub quit: Vec<String>,
    pub help: Vec<String>,
    pub refresh: Vec<String>,
    pub add: Vec<String>,
    pub logout: Vec<String>,
}

impl Default for GlobalBindings {
    fn default() -> Self {
        Self {
            quit: vec!["ctrl+q".to_string(), "q".to_string()],
            help: vec!["?".to_string()],
            refresh: vec!["r".to_string()],
            add: vec!["a".to_string(), "i".to_string()],
            logout: vec!["ctrl+l".to_string()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ListBindings {
    pub up: Vec<String>,
    pub down: Vec<String>,
    pub toggle: Vec<String>,
    pub delete: Vec<String>,
    pub edit: Vec<String>,
}

impl Default for ListBindings {
    fn default() -> Self {
        Self {
            up: vec!["k".to_string(), "up".to_string()],
            down: vec!["j".to_string(), "down".to_string()],
            toggle: vec!["space".to_string(), "enter".to_string()],
            delete: vec!["d".to_string(), "delete".to_string()],
            edit: vec!["e".to_string()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FormBindings {
    pub submit: Vec<String>,
    pub cancel: Vec<String>,
    pub next_field: Vec<String>,
}

impl Default for FormBindings {
    fn default() -> Self {
        Self {
            submit: vec!["enter".to_string()],
            cancel: vec!["esc".to_string()],
            next_field: vec!["tab".to_string()],
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = config_path();

        let config = if let Ok(content) = fs::read_to_string(&config_path) {
            match toml::from_str::<Config>(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Failed to parse config.toml ({config_path:?}), using defaults: {e}");
                    Config::default()
                }
            }
        } else {
            Config::default()
        };

        if !config_path.exists() {
            let _ = config.save_to_path(&config_path);
        }

        config
    }

    pub fn save_to_path(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    #[test]
    fn matches_plain_and_modified_keys() {
        let quit = vec!["ctrl+q".to_string(), "q".to_string()];
        assert!(key_match(
            &KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE),
            &quit
        ));
        assert!(key_match(
            &KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL),
            &quit
        ));
        assert!(!key_match(
            &KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE),
            &quit
        ));
    }

    #[test]
    fn shift_is_implied_for_characters() {
        let help = vec!["?".to_string()];
        assert!(key_match(
            &KeyEvent::new(KeyCode::Char('?'), KeyModifiers::SHIFT),
            &help
        ));
    }

    #[test]
    fn named_keys_match() {
        let toggle = vec!["space".to_string(), "enter".to_string()];
        assert!(key_match(
            &KeyEvent::new(KeyCode::Char(' '), KeyModifiers::NONE),
            &toggle
        ));
        assert!(key_match(
            &KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE),
            &toggle
        ));
    }

    #[test]
    fn logout_target_falls_back_to_redirect() {
        let mut auth = AuthConfig::default();
        assert_eq!(auth.logout_target(), auth.redirect_uri.as_str());
        auth.logout_uri = "https://example.com/bye".to_string();
        assert_eq!(auth.logout_target(), "https://example.com/bye");
    }
}
