// Oracle Session Management
// Holds the single live session and establishes it by trying several connect-string formats

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::db::traits::{Connection, Credentials, DatabaseDriver, DatabaseError};
use crate::error::{Result, StudioError};

/// Default Oracle listener port
pub const DEFAULT_PORT: u16 = 1521;

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// A port sent as a JSON number or as a numeric string (HTML forms send strings)
pub fn port_from_value(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Missing, null or blank means the default listener port
fn lenient_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(DEFAULT_PORT),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(DEFAULT_PORT),
        Some(value) => port_from_value(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid port: {}", value))),
    }
}

/// Connection parameters supplied with a connect request (never persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    #[serde(default)]
    pub hostname: String,
    #[serde(default = "default_port", deserialize_with = "lenient_port")]
    pub port: u16,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)] // Don't serialize password
    pub password: String,
}

impl ConnectionConfig {
    pub fn new(
        hostname: impl Into<String>,
        port: u16,
        service_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            service_name: service_name.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(StudioError::InputValidation("Hostname is required".to_string()));
        }
        if self.service_name.trim().is_empty() {
            return Err(StudioError::InputValidation("Service name is required".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(StudioError::InputValidation("Username is required".to_string()));
        }
        Ok(())
    }

    /// `host:port`, as shown to the operator
    pub fn server(&self) -> String {
        format!("{}:{}", self.hostname.trim(), self.port)
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Connect-string encodings, tried in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectStringFormat {
    /// `host:port/service_name`
    ServiceName,
    /// `host:port:sid`, reusing the service name as SID
    Sid,
    /// Full `(DESCRIPTION=...)` descriptor
    Descriptor,
}

impl ConnectStringFormat {
    pub const ORDERED: [ConnectStringFormat; 3] = [
        ConnectStringFormat::ServiceName,
        ConnectStringFormat::Sid,
        ConnectStringFormat::Descriptor,
    ];

    pub fn build(&self, config: &ConnectionConfig) -> String {
        let host = config.hostname.trim();
        let service = config.service_name.trim();
        match self {
            ConnectStringFormat::ServiceName => format!("{}:{}/{}", host, config.port, service),
            ConnectStringFormat::Sid => format!("{}:{}:{}", host, config.port, service),
            ConnectStringFormat::Descriptor => format!(
                "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST={})(PORT={}))(CONNECT_DATA=(SERVICE_NAME={})))",
                host, config.port, service
            ),
        }
    }
}

/// Why a connect attempt failed, as far as the operator is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectFailureKind {
    UnreachableHost,
    ListenerDown,
    UnknownService,
    InvalidCredentials,
    Other,
}

impl ConnectFailureKind {
    /// Classify from the structured ORA code, never from message text
    pub fn classify(err: &DatabaseError) -> Self {
        match err.oracle_code() {
            Some(12170 | 12535 | 12543 | 12545 | 12560) => ConnectFailureKind::UnreachableHost,
            Some(12541) => ConnectFailureKind::ListenerDown,
            Some(12514 | 12505) => ConnectFailureKind::UnknownService,
            Some(1017 | 28000) => ConnectFailureKind::InvalidCredentials,
            _ => ConnectFailureKind::Other,
        }
    }

    /// Another address encoding can't fix a rejected login
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectFailureKind::InvalidCredentials)
    }

    fn message(&self) -> Option<&'static str> {
        match self {
            ConnectFailureKind::UnreachableHost => Some("Could not reach the Oracle server"),
            ConnectFailureKind::ListenerDown => Some("TNS: no listener"),
            ConnectFailureKind::UnknownService => {
                Some("TNS: listener does not recognize the service name")
            }
            ConnectFailureKind::InvalidCredentials => Some("Invalid username or password"),
            ConnectFailureKind::Other => None,
        }
    }

    fn suggestions(&self, hostname: &str) -> Vec<String> {
        match self {
            ConnectFailureKind::UnreachableHost => vec![
                "Check that the hostname/IP is correct".to_string(),
                format!("Confirm the port is correct (default: {})", DEFAULT_PORT),
                format!("Test connectivity: ping {}", hostname),
                "Check that no firewall is blocking the port".to_string(),
                "Confirm the Oracle database is running".to_string(),
            ],
            ConnectFailureKind::ListenerDown => vec![
                "The Oracle listener is not running".to_string(),
                "Check that the listener service is active".to_string(),
                format!("Confirm the listener port (default: {})", DEFAULT_PORT),
            ],
            ConnectFailureKind::UnknownService => vec![
                "Check that the service name is correct".to_string(),
                "Try using the SID instead of the service name".to_string(),
                "Consult tnsnames.ora or listener.ora".to_string(),
            ],
            ConnectFailureKind::InvalidCredentials => vec![
                "Check the username".to_string(),
                "Confirm the password".to_string(),
                "Check that the account is not locked".to_string(),
            ],
            ConnectFailureKind::Other => Vec::new(),
        }
    }
}

/// Final outcome of a failed connect, built from the last driver error
#[derive(Debug, Clone)]
pub struct ConnectFailure {
    pub kind: ConnectFailureKind,
    pub message: String,
    pub suggestions: Vec<String>,
    pub original_error: String,
    /// Formats actually tried, in order
    pub attempted: Vec<ConnectStringFormat>,
}

impl ConnectFailure {
    pub fn from_error(
        err: &DatabaseError,
        hostname: &str,
        attempted: Vec<ConnectStringFormat>,
    ) -> Self {
        let kind = ConnectFailureKind::classify(err);
        let original_error = err.to_string();
        Self {
            kind,
            message: kind
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| original_error.clone()),
            suggestions: kind.suggestions(hostname),
            original_error,
            attempted,
        }
    }
}

/// The one live database session
pub struct Session {
    pub id: String,
    pub server: String,
    pub service: String,
    pub user: String,
    pub format: ConnectStringFormat,
    pub connected_at: DateTime<Utc>,
    connection: Box<dyn Connection>,
}

impl Session {
    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }
}

/// What the operator sees after a successful connect
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub server: String,
    pub service: String,
    pub user: String,
    pub format: ConnectStringFormat,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            server: session.server.clone(),
            service: session.service.clone(),
            user: session.user.clone(),
            format: session.format,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub timestamp: DateTime<Utc>,
}

/// Owns the single session slot and its lifecycle
pub struct ConnectionManager {
    driver: Arc<dyn DatabaseDriver>,
    session: RwLock<Option<Arc<Session>>>,
}

impl ConnectionManager {
    pub fn new(driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            driver,
            session: RwLock::new(None),
        }
    }

    /// Replace any current session with a new one
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<SessionInfo> {
        config.validate()?;

        info!(
            host = %config.hostname,
            port = config.port,
            service = %config.service_name,
            user = %config.username,
            driver = self.driver.driver_name(),
            "Attempting connection"
        );

        // Close the previous session first; a stale close must not block the new one
        let previous = self.session.write().await.take();
        if let Some(previous) = previous {
            self.close_stale(&previous).await;
        }

        let credentials = config.credentials();
        let mut attempted = Vec::new();
        let mut last_error = None;

        for (attempt, format) in ConnectStringFormat::ORDERED.iter().enumerate() {
            let connect_string = format.build(config);
            info!(attempt = attempt + 1, ?format, %connect_string, "Connect attempt");
            attempted.push(*format);

            match self.driver.connect(&credentials, &connect_string).await {
                Ok(connection) => {
                    let session = Session {
                        id: connection.connection_id().to_string(),
                        server: config.server(),
                        service: config.service_name.trim().to_string(),
                        user: config.username.clone(),
                        format: *format,
                        connected_at: Utc::now(),
                        connection,
                    };
                    let info = SessionInfo::from(&session);
                    info!(session_id = %session.id, ?format, "Connection established");
                    let displaced = self.session.write().await.replace(Arc::new(session));
                    // A concurrent connect may have installed its session meanwhile
                    if let Some(displaced) = displaced {
                        self.close_stale(&displaced).await;
                    }
                    return Ok(info);
                }
                Err(e) => {
                    let kind = ConnectFailureKind::classify(&e);
                    warn!(attempt = attempt + 1, ?kind, "Connect attempt failed: {}", e);
                    last_error = Some(e);
                    if kind.is_terminal() {
                        break;
                    }
                }
            }
        }

        let err = last_error
            .unwrap_or_else(|| DatabaseError::driver(None, "No connect string was attempted"));
        let failure = ConnectFailure::from_error(&err, config.hostname.trim(), attempted);
        error!(kind = ?failure.kind, "Connection failed: {}", failure.original_error);
        Err(failure.into())
    }

    async fn close_stale(&self, session: &Session) {
        if let Err(e) = session.connection().close().await {
            warn!(session_id = %session.id, "Failed to close previous session: {}", e);
        }
    }

    /// Drop the current session; succeeds silently when there is none
    pub async fn disconnect(&self) -> Result<bool> {
        let current = self.session.write().await.take();
        match current {
            Some(session) => {
                session
                    .connection()
                    .close()
                    .await
                    .map_err(|e| StudioError::Disconnect(e.to_string()))?;
                info!(session_id = %session.id, "Disconnected");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The current session, or `NotConnected`
    pub async fn current(&self) -> Result<Arc<Session>> {
        self.session
            .read()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(StudioError::NotConnected)
    }

    pub async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.is_connected().await,
            timestamp: Utc::now(),
        }
    }

    /// Best-effort close on process shutdown
    pub async fn shutdown(&self) {
        let current = self.session.write().await.take();
        if let Some(session) = current {
            match session.connection().close().await {
                Ok(()) => info!(session_id = %session.id, "Oracle session closed"),
                Err(e) => error!(session_id = %session.id, "Failed to close Oracle session: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::drivers::{DriverEvent, InMemoryDriver};
    use std::time::Duration;

    fn sample_config() -> ConnectionConfig {
        ConnectionConfig::new("db.local", 1521, "ORCLPDB1", "app1", "secret")
    }

    fn ora(code: i32) -> DatabaseError {
        DatabaseError::driver(Some(code), format!("ORA-{:05}: simulated", code))
    }

    #[test]
    fn test_connect_string_formats() {
        let config = sample_config();
        assert_eq!(ConnectStringFormat::ServiceName.build(&config), "db.local:1521/ORCLPDB1");
        assert_eq!(ConnectStringFormat::Sid.build(&config), "db.local:1521:ORCLPDB1");
        assert_eq!(
            ConnectStringFormat::Descriptor.build(&config),
            "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST=db.local)(PORT=1521))(CONNECT_DATA=(SERVICE_NAME=ORCLPDB1)))"
        );
    }

    #[test]
    fn test_config_deserialize_defaults_port() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"hostname":"h","serviceName":"XE","username":"u","password":"p"}"#,
        )
        .unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.service_name, "XE");

        let serialized = serde_json::to_string(&config).unwrap();
        assert!(!serialized.contains("\"p\""));
    }

    #[test]
    fn test_config_accepts_string_port() {
        let parse = |port: &str| {
            let body = format!(
                r#"{{"hostname":"h","port":{},"serviceName":"XE","username":"u"}}"#,
                port
            );
            serde_json::from_str::<ConnectionConfig>(&body)
        };

        assert_eq!(parse(r#""1522""#).unwrap().port, 1522);
        assert_eq!(parse(r#"" 1522 ""#).unwrap().port, 1522);
        assert_eq!(parse(r#""""#).unwrap().port, DEFAULT_PORT);
        assert_eq!(parse("null").unwrap().port, DEFAULT_PORT);
        assert!(parse(r#""abc""#).is_err());
        assert!(parse("70000").is_err());
    }

    #[test]
    fn test_port_from_value() {
        assert_eq!(port_from_value(&Value::from(1521)), Some(1521));
        assert_eq!(port_from_value(&Value::from(" 1521 ")), Some(1521));
        assert_eq!(port_from_value(&Value::from(-1)), None);
        assert_eq!(port_from_value(&Value::from("x")), None);
        assert_eq!(port_from_value(&Value::Bool(true)), None);
    }

    #[test]
    fn test_config_validation() {
        assert!(sample_config().validate().is_ok());
        let mut config = sample_config();
        config.hostname = "  ".to_string();
        assert!(matches!(config.validate(), Err(StudioError::InputValidation(_))));
    }

    #[test]
    fn test_classification_by_code() {
        assert_eq!(ConnectFailureKind::classify(&ora(12545)), ConnectFailureKind::UnreachableHost);
        assert_eq!(ConnectFailureKind::classify(&ora(12541)), ConnectFailureKind::ListenerDown);
        assert_eq!(ConnectFailureKind::classify(&ora(12514)), ConnectFailureKind::UnknownService);
        assert_eq!(
            ConnectFailureKind::classify(&ora(1017)),
            ConnectFailureKind::InvalidCredentials
        );
        assert_eq!(ConnectFailureKind::classify(&ora(600)), ConnectFailureKind::Other);
        // Text alone is not enough
        let text_only = DatabaseError::driver(None, "ORA-01017: invalid username/password");
        assert_eq!(ConnectFailureKind::classify(&text_only), ConnectFailureKind::Other);
    }

    #[test]
    fn test_failure_messages_and_suggestions() {
        let failure = ConnectFailure::from_error(&ora(12541), "db.local", vec![]);
        assert_eq!(failure.message, "TNS: no listener");
        assert_eq!(failure.suggestions.len(), 3);
        assert!(failure.original_error.contains("ORA-12541"));

        let failure = ConnectFailure::from_error(&ora(12170), "db.local", vec![]);
        assert!(failure.suggestions.iter().any(|s| s == "Test connectivity: ping db.local"));

        let failure = ConnectFailure::from_error(&ora(1234), "db.local", vec![]);
        assert_eq!(failure.message, failure.original_error);
        assert!(failure.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_connect_uses_first_working_format() {
        let driver = Arc::new(InMemoryDriver::new());
        let manager = ConnectionManager::new(driver.clone());

        let info = manager.connect(&sample_config()).await.unwrap();
        assert_eq!(info.server, "db.local:1521");
        assert_eq!(info.format, ConnectStringFormat::ServiceName);
        assert_eq!(driver.connect_attempts(), vec!["db.local:1521/ORCLPDB1".to_string()]);
        assert!(manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_connect_falls_through_to_descriptor() {
        let driver = Arc::new(
            InMemoryDriver::new()
                .with_connect_failure(ora(12514))
                .with_connect_failure(ora(12505)),
        );
        let manager = ConnectionManager::new(driver.clone());

        let info = manager.connect(&sample_config()).await.unwrap();
        assert_eq!(info.format, ConnectStringFormat::Descriptor);
        assert_eq!(driver.connect_attempts().len(), 3);
    }

    #[tokio::test]
    async fn test_bad_credentials_stop_after_first_attempt() {
        let driver = Arc::new(InMemoryDriver::new().with_connect_failure(ora(1017)));
        let manager = ConnectionManager::new(driver.clone());

        let err = manager.connect(&sample_config()).await.unwrap_err();
        match err {
            StudioError::ConnectionFailure(failure) => {
                assert_eq!(failure.kind, ConnectFailureKind::InvalidCredentials);
                assert_eq!(failure.attempted, vec![ConnectStringFormat::ServiceName]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(driver.connect_attempts().len(), 1);
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_all_formats_fail_reports_last_error() {
        let driver = Arc::new(
            InMemoryDriver::new()
                .with_connect_failure(ora(12514))
                .with_connect_failure(ora(12505))
                .with_connect_failure(ora(12541)),
        );
        let manager = ConnectionManager::new(driver.clone());

        let err = manager.connect(&sample_config()).await.unwrap_err();
        match err {
            StudioError::ConnectionFailure(failure) => {
                assert_eq!(failure.kind, ConnectFailureKind::ListenerDown);
                assert_eq!(failure.attempted.len(), 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reconnect_closes_previous_session() {
        let driver = Arc::new(InMemoryDriver::new());
        let manager = ConnectionManager::new(driver.clone());

        let first = manager.connect(&sample_config()).await.unwrap();
        let second = manager.connect(&sample_config()).await.unwrap();

        assert_ne!(first.session_id, second.session_id);
        assert_eq!(driver.closed_connections(), vec![first.session_id.clone()]);
        assert_eq!(manager.current().await.unwrap().id, second.session_id);

        // The old session is closed before the new connect is attempted
        let connect_string = "db.local:1521/ORCLPDB1".to_string();
        assert_eq!(
            driver.events(),
            vec![
                DriverEvent::Connect(connect_string.clone()),
                DriverEvent::Close(first.session_id),
                DriverEvent::Connect(connect_string),
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_connects_leave_one_open_session() {
        let driver = Arc::new(InMemoryDriver::new().with_connect_delay(Duration::from_millis(20)));
        let manager = ConnectionManager::new(driver.clone());

        let config = sample_config();
        let (a, b) = tokio::join!(manager.connect(&config), manager.connect(&config));
        let (a, b) = (a.unwrap(), b.unwrap());

        let current = manager.current().await.unwrap().id.clone();
        assert!(current == a.session_id || current == b.session_id);
        let loser = if current == a.session_id { b.session_id } else { a.session_id };
        assert_eq!(driver.closed_connections(), vec![loser]);
    }

    #[tokio::test]
    async fn test_reconnect_swallows_close_failure() {
        let driver = Arc::new(InMemoryDriver::new().with_close_failure(ora(3113)));
        let manager = ConnectionManager::new(driver.clone());

        manager.connect(&sample_config()).await.unwrap();
        let second = manager.connect(&sample_config()).await.unwrap();
        assert_eq!(manager.current().await.unwrap().id, second.session_id);
    }

    #[tokio::test]
    async fn test_failed_reconnect_leaves_no_session() {
        let driver = Arc::new(InMemoryDriver::new());
        let manager = ConnectionManager::new(driver.clone());
        manager.connect(&sample_config()).await.unwrap();

        driver.push_connect_failure(ora(1017));
        assert!(manager.connect(&sample_config()).await.is_err());
        assert!(matches!(manager.current().await, Err(StudioError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let driver = Arc::new(InMemoryDriver::new());
        let manager = ConnectionManager::new(driver.clone());

        assert!(!manager.disconnect().await.unwrap());
        manager.connect(&sample_config()).await.unwrap();
        assert!(manager.disconnect().await.unwrap());
        assert!(!manager.disconnect().await.unwrap());
        assert!(!manager.status().await.connected);
    }

    #[tokio::test]
    async fn test_disconnect_clears_session_even_if_close_fails() {
        let driver = Arc::new(InMemoryDriver::new().with_close_failure(ora(3113)));
        let manager = ConnectionManager::new(driver.clone());
        manager.connect(&sample_config()).await.unwrap();

        assert!(matches!(manager.disconnect().await, Err(StudioError::Disconnect(_))));
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_shutdown_never_fails() {
        let driver = Arc::new(InMemoryDriver::new().with_close_failure(ora(3113)));
        let manager = ConnectionManager::new(driver.clone());
        manager.connect(&sample_config()).await.unwrap();

        manager.shutdown().await;
        assert!(!manager.is_connected().await);
    }
}
