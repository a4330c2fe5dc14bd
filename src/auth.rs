use crate::config::AuthConfig;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Local};
use log::{debug, warn};
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration as StdDuration;

#[derive(Debug)]
pub enum AuthError {
    Config(String),
    Io(String),
    MissingToken,
    Malformed,
}

impl AuthError {
    pub fn message(&self) -> String {
        match self {
            AuthError::Config(msg) => msg.clone(),
            AuthError::Io(msg) => msg.clone(),
            AuthError::MissingToken => "No credential in redirect.".to_string(),
            AuthError::Malformed => "Credential is malformed.".to_string(),
        }
    }
}

impl From<io::Error> for AuthError {
    fn from(err: io::Error) -> Self {
        AuthError::Io(err.to_string())
    }
}

/// A syntactically well-formed bearer credential. Either a `Credential`
/// exists and has three independently base64url-decodable segments, or
/// there is no credential at all; nothing in between is representable.
#[derive(Clone)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn new(raw: &str) -> Option<Credential> {
        let trimmed = raw.trim();
        let segments: Vec<&str> = trimmed.split('.').collect();
        if segments.len() != 3 {
            return None;
        }
        for segment in &segments {
            if segment.is_empty() || decode_segment(segment).is_none() {
                return None;
            }
        }
        Some(Credential {
            token: trimmed.to_string(),
        })
    }

    pub fn bearer(&self) -> &str {
        &self.token
    }

    /// Display-only claim set. The server is the sole authority on what the
    /// token grants; a token whose payload does not decode still works as a
    /// bearer string and simply renders as unauthenticated.
    pub fn claims(&self) -> Option<Claims> {
        let payload = self.token.split('.').nth(1)?;
        let bytes = decode_segment(payload)?;
        serde_json::from_slice(&bytes).ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "sub")]
    pub subject: Option<String>,
    #[serde(default, rename = "exp")]
    pub expires_at: Option<i64>,
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()
}

/// Extracts the identity token from an implicit-flow redirect fragment
/// (`id_token=...&state=...`, with or without a leading `#`).
pub fn token_from_fragment(fragment: &str) -> Option<String> {
    let stripped = fragment.strip_prefix('#').unwrap_or(fragment);
    let params = parse_query(stripped);
    params.get("id_token").filter(|t| !t.is_empty()).cloned()
}

pub fn login_url(auth: &AuthConfig, state: Option<&str>) -> Result<String, AuthError> {
    if !auth.is_configured() {
        return Err(AuthError::Config(
            "auth.domain and auth.client_id required in config.toml".to_string(),
        ));
    }

    let scope = auth.scopes.join(" ");
    let mut params = vec![
        ("client_id", auth.client_id.as_str()),
        ("redirect_uri", auth.redirect_uri.as_str()),
        ("response_type", "token"),
        ("scope", scope.as_str()),
    ];
    if let Some(state) = state {
        params.push(("state", state));
    }

    let base = format!("{}/login", auth.domain.trim_end_matches('/'));
    Ok(Url::parse_with_params(&base, params)
        .map_err(|e| AuthError::Config(e.to_string()))?
        .to_string())
}

pub fn logout_url(auth: &AuthConfig) -> Result<String, AuthError> {
    if !auth.is_configured() {
        return Err(AuthError::Config(
            "auth.domain and auth.client_id required in config.toml".to_string(),
        ));
    }

    let base = format!("{}/logout", auth.domain.trim_end_matches('/'));
    Ok(Url::parse_with_params(
        &base,
        [
            ("client_id", auth.client_id.as_str()),
            ("logout_uri", auth.logout_target()),
        ],
    )
    .map_err(|e| AuthError::Config(e.to_string()))?
    .to_string())
}

pub enum StartupResolution {
    /// A credential is active; no navigation needed.
    Active,
    /// Nothing usable was delivered or persisted; the caller should start
    /// the login flow.
    LoginRequired,
}

/// Owns the single active credential: resolution at startup, persistence to
/// the token file, and invalidation on logout. The token file holds exactly
/// one value, the raw credential string.
pub struct CredentialStore {
    auth: AuthConfig,
    token_path: PathBuf,
    credential: Option<Credential>,
}

impl CredentialStore {
    pub fn new(auth: AuthConfig, token_path: PathBuf) -> Self {
        Self {
            auth,
            token_path,
            credential: None,
        }
    }

    pub fn auth_config(&self) -> &AuthConfig {
        &self.auth
    }

    pub fn active(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// The one startup transition: a fragment delivered by the redirect wins,
    /// then the persisted token, then login. A malformed value anywhere is
    /// treated as absent.
    pub fn resolve_on_startup(&mut self, fragment: Option<&str>) -> StartupResolution {
        if let Some(fragment) = fragment {
            match self.complete_login(fragment) {
                Ok(()) => return StartupResolution::Active,
                Err(err) => warn!("ignoring delivered fragment: {}", err.message()),
            }
        }

        if let Some(credential) = load_token(&self.token_path) {
            debug!("using persisted credential");
            self.credential = Some(credential);
            return StartupResolution::Active;
        }

        StartupResolution::LoginRequired
    }

    /// Consumes a redirect fragment: extracts the token, validates its shape,
    /// persists it, and makes it the active credential.
    pub fn complete_login(&mut self, fragment: &str) -> Result<(), AuthError> {
        let token = token_from_fragment(fragment).ok_or(AuthError::MissingToken)?;
        let credential = Credential::new(&token).ok_or(AuthError::Malformed)?;
        if let Err(err) = save_token(&self.token_path, credential.bearer()) {
            warn!("credential not persisted: {}", err.message());
        }
        self.credential = Some(credential);
        Ok(())
    }

    /// Clears the persisted and in-memory credential and returns the hosted
    /// logout URL for the caller to open. Requests already in flight keep
    /// their clone of the old credential and fail on their own.
    pub fn logout(&mut self) -> Result<String, AuthError> {
        self.credential = None;
        if self.token_path.exists() {
            fs::remove_file(&self.token_path)?;
        }
        logout_url(&self.auth)
    }
}

fn load_token(path: &Path) -> Option<Credential> {
    let content = fs::read_to_string(path).ok()?;
    let credential = Credential::new(&content);
    if credential.is_none() {
        warn!("persisted credential is malformed; treating as absent");
    }
    credential
}

fn save_token(path: &Path, token: &str) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, token)?;
    Ok(())
}

#[derive(Clone, Debug)]
pub struct LoginDisplay {
    pub login_url: String,
    pub listen_addr: String,
    pub expires_at: DateTime<Local>,
}

/// A pending implicit-flow login: the loopback listener waiting for the
/// provider's redirect, plus the URL the user's browser was sent to.
pub struct LoginSession {
    pub display: LoginDisplay,
    listener: TcpListener,
    state: String,
    expires_at: DateTime<Local>,
}

pub enum LoginOutcome {
    /// The raw fragment parameters relayed from the redirect page.
    Fragment(String),
    Error(String),
}

pub fn start_login_flow(auth: &AuthConfig) -> Result<LoginSession, AuthError> {
    let state = generate_state();
    let url = login_url(auth, Some(&state))?;

    let bind_addr = listener_addr(&auth.redirect_uri)?;
    let listener = TcpListener::bind(&bind_addr).map_err(|e| {
        AuthError::Config(format!("cannot listen on {bind_addr} for the login redirect: {e}"))
    })?;
    let expires_at = Local::now() + Duration::minutes(10);

    Ok(LoginSession {
        display: LoginDisplay {
            login_url: url,
            listen_addr: bind_addr,
            expires_at,
        },
        listener,
        state,
        expires_at,
    })
}

/// Waits for the redirect on a background thread. The first request (the
/// provider's redirect target) gets a relay page that strips the token
/// fragment from the browser's visible location before forwarding its
/// parameters; the follow-up capture request delivers them here.
pub fn spawn_redirect_poll(session: LoginSession) -> Receiver<LoginOutcome> {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        if let Err(err) = session.listener.set_nonblocking(true) {
            let _ = tx.send(LoginOutcome::Error(err.to_string()));
            return;
        }

        loop {
            if Local::now() >= session.expires_at {
                let _ = tx.send(LoginOutcome::Error(
                    "Login expired. Please retry.".to_string(),
                ));
                return;
            }

            match session.listener.accept() {
                Ok((mut stream, _addr)) => {
                    match handle_redirect_request(&session, &mut stream) {
                        Ok(Some(fragment)) => {
                            let _ = tx.send(LoginOutcome::Fragment(fragment));
                            return;
                        }
                        Ok(None) => {} // served the relay page; keep listening
                        Err(err) => {
                            let _ = tx.send(LoginOutcome::Error(err));
                            return;
                        }
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(StdDuration::from_millis(200));
                }
                Err(err) => {
                    let _ = tx.send(LoginOutcome::Error(err.to_string()));
                    return;
                }
            }
        }
    });

    rx
}

const CAPTURE_PATH: &str = "/capture";

// The fragment never reaches a plain HTTP listener, so the redirect target
// serves this page: it erases the fragment from the address bar and history,
// then hands the parameters over as a query string.
const RELAY_PAGE: &str = "<!doctype html><html><body><script>\
var h = window.location.hash.replace(/^#/, \"\");\
history.replaceState(null, \"\", window.location.pathname);\
if (h) { window.location.replace(\"/capture?\" + h); }\
else { document.body.textContent = \"No credential in redirect. Return to the terminal and retry.\"; }\
</script></body></html>";

fn handle_redirect_request(
    session: &LoginSession,
    stream: &mut TcpStream,
) -> Result<Option<String>, String> {
    let request_line = read_request_line(stream).map_err(|e| e.to_string())?;
    let path = request_line.split_whitespace().nth(1).unwrap_or("/");

    if let Some(query) = path
        .strip_prefix(CAPTURE_PATH)
        .and_then(|rest| rest.strip_prefix('?'))
    {
        let params = parse_query(query);

        if let Some(error) = params.get("error") {
            let desc = params
                .get("error_description")
                .map(|s| format!(" ({s})"))
                .unwrap_or_default();
            let _ = respond_with_message(stream, &format!("Sign-in failed: {error}{desc}"));
            return Err(format!("Sign-in failed: {error}{desc}"));
        }

        if params.get("state").map(String::as_str) != Some(session.state.as_str()) {
            let _ = respond_with_message(stream, "Invalid state.");
            return Err("Invalid login state. Please retry.".to_string());
        }

        if !params.contains_key("id_token") {
            let _ = respond_with_message(stream, "Missing credential in redirect.");
            return Err("Redirect carried no credential.".to_string());
        }

        let _ = respond_with_message(stream, "Signed in. You can close this window.");
        return Ok(Some(query.to_string()));
    }

    let _ = respond_with_html(stream, RELAY_PAGE);
    Ok(None)
}

// GET requests carry no body, so the first CRLF-terminated line is all we
// need; browsers hold the connection open, which rules out read_to_end.
fn read_request_line(stream: &mut TcpStream) -> io::Result<String> {
    stream.set_read_timeout(Some(StdDuration::from_secs(2)))?;
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    while line.len() < 8192 {
        match stream.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                if byte[0] != b'\r' {
                    line.push(byte[0]);
                }
            }
            Err(err) => return Err(err),
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

fn respond_with_message(stream: &mut TcpStream, message: &str) -> io::Result<()> {
    let body = format!("{message}\n");
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())
}

fn respond_with_html(stream: &mut TcpStream, body: &str) -> io::Result<()> {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())
}

fn listener_addr(redirect_uri: &str) -> Result<String, AuthError> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| AuthError::Config(format!("auth.redirect_uri is not a URL: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| AuthError::Config("auth.redirect_uri has no host".to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| AuthError::Config("auth.redirect_uri has no port".to_string()))?;
    Ok(format!("{host}:{port}"))
}

fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(decode_component(key), decode_component(value));
    }
    params
}

fn decode_component(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::new();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Some(hex) = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok())
                {
                    out.push(hex as char);
                    i += 3;
                } else {
                    out.push('%');
                    i += 1;
                }
            }
            _ => {
                out.push(bytes[i] as char);
                i += 1;
            }
        }
    }
    out
}

fn generate_state() -> String {
    use rand::{Rng, distributions::Alphanumeric};
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn encode(bytes: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn make_token(payload: &serde_json::Value) -> String {
        format!(
            "{}.{}.{}",
            encode(br#"{"alg":"RS256","typ":"JWT"}"#),
            encode(payload.to_string().as_bytes()),
            encode(b"signature")
        )
    }

    fn temp_data_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        dir.push(format!("todopad-test-{}-{}", std::process::id(), stamp));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn test_auth() -> AuthConfig {
        AuthConfig {
            domain: "https://example.auth.test".to_string(),
            client_id: "client123".to_string(),
            redirect_uri: "http://localhost:53682/".to_string(),
            scopes: vec!["email".to_string(), "openid".to_string()],
            logout_uri: String::new(),
        }
    }

    #[test]
    fn claims_round_trip_well_formed_token() {
        let token = make_token(&json!({
            "email": "user@example.com",
            "sub": "abc-123",
            "exp": 1_900_000_000i64,
        }));
        let credential = Credential::new(&token).expect("well-formed");
        let claims = credential.claims().expect("claims");
        assert_eq!(claims.email.as_deref(), Some("user@example.com"));
        assert_eq!(claims.subject.as_deref(), Some("abc-123"));
        assert_eq!(claims.expires_at, Some(1_900_000_000));
    }

    #[test]
    fn malformed_tokens_yield_no_credential() {
        assert!(Credential::new("only.two").is_none());
        assert!(Credential::new("a.b.c.d").is_none());
        assert!(Credential::new("").is_none());
        // middle segment is not base64url
        assert!(Credential::new("abc.!!!.def").is_none());
    }

    #[test]
    fn invalid_payload_json_degrades_to_no_claims() {
        let token = format!(
            "{}.{}.{}",
            encode(b"header"),
            encode(b"this is not json"),
            encode(b"sig")
        );
        let credential = Credential::new(&token).expect("segments decode");
        assert!(credential.claims().is_none());
    }

    #[test]
    fn extracts_token_from_fragment_variants() {
        assert_eq!(
            token_from_fragment("#id_token=abc&state=s1").as_deref(),
            Some("abc")
        );
        assert_eq!(token_from_fragment("id_token=abc").as_deref(), Some("abc"));
        assert_eq!(
            token_from_fragment("state=s1&id_token=abc&expires_in=3600").as_deref(),
            Some("abc")
        );
        assert!(token_from_fragment("state=s1").is_none());
        assert!(token_from_fragment("").is_none());
    }

    #[test]
    fn startup_fragment_persists_and_activates() {
        let dir = temp_data_dir();
        let token_path = dir.join("token");
        let token = make_token(&json!({"email": "me@example.com"}));
        let mut store = CredentialStore::new(test_auth(), token_path.clone());

        let resolution = store.resolve_on_startup(Some(&format!("#id_token={token}&state=x")));
        assert!(matches!(resolution, StartupResolution::Active));
        assert_eq!(fs::read_to_string(&token_path).expect("persisted"), token);
        assert_eq!(store.active().expect("active").bearer(), token);
    }

    #[test]
    fn startup_uses_persisted_token_without_fragment() {
        let dir = temp_data_dir();
        let token_path = dir.join("token");
        let token = make_token(&json!({"email": "me@example.com"}));
        fs::write(&token_path, &token).expect("seed token");

        let mut store = CredentialStore::new(test_auth(), token_path);
        let resolution = store.resolve_on_startup(None);
        assert!(matches!(resolution, StartupResolution::Active));
        assert_eq!(store.active().expect("active").bearer(), token);
    }

    #[test]
    fn malformed_persisted_token_is_treated_as_absent() {
        let dir = temp_data_dir();
        let token_path = dir.join("token");
        fs::write(&token_path, "garbage-without-segments").expect("seed");

        let mut store = CredentialStore::new(test_auth(), token_path);
        let resolution = store.resolve_on_startup(None);
        assert!(matches!(resolution, StartupResolution::LoginRequired));
        assert!(store.active().is_none());
    }

    #[test]
    fn logout_clears_persisted_credential() {
        let dir = temp_data_dir();
        let token_path = dir.join("token");
        let token = make_token(&json!({"email": "me@example.com"}));

        let mut store = CredentialStore::new(test_auth(), token_path.clone());
        store
            .complete_login(&format!("id_token={token}"))
            .expect("login");
        assert!(token_path.exists());

        let url = store.logout().expect("logout url");
        assert!(url.contains("client_id=client123"));
        assert!(!token_path.exists());
        assert!(store.active().is_none());

        // A fresh startup with nothing delivered must fall through to login.
        let resolution = store.resolve_on_startup(None);
        assert!(matches!(resolution, StartupResolution::LoginRequired));
    }

    #[test]
    fn login_url_carries_implicit_flow_parameters() {
        let url = login_url(&test_auth(), Some("nonce1")).expect("url");
        assert!(url.starts_with("https://example.auth.test/login?"));
        assert!(url.contains("client_id=client123"));
        assert!(url.contains("response_type=token"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A53682%2F"));
        assert!(url.contains("scope=email+openid") || url.contains("scope=email%20openid"));
        assert!(url.contains("state=nonce1"));
    }

    #[test]
    fn login_url_requires_configuration() {
        let auth = AuthConfig::default();
        assert!(login_url(&auth, None).is_err());
    }

    #[test]
    fn relay_page_strips_fragment_before_forwarding() {
        // The replaceState call must run before the capture navigation so the
        // token never survives in the browser's visible location or history.
        let replace_at = RELAY_PAGE.find("history.replaceState").expect("strips");
        let forward_at = RELAY_PAGE.find("/capture?").expect("forwards");
        assert!(replace_at < forward_at);
    }

    #[test]
    fn listener_addr_from_redirect_uri() {
        assert_eq!(
            listener_addr("http://localhost:53682/").expect("addr"),
            "localhost:53682"
        );
        assert_eq!(
            listener_addr("http://127.0.0.1/").expect("addr"),
            "127.0.0.1:80"
        );
        assert!(listener_addr("not a url").is_err());
    }
}
