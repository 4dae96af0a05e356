//! UDP SNMP session using the `async-snmp` client

use super::{BindingValue, PollingSession, SessionError, VarBinding};
use async_snmp::{Auth, AuthProtocol, Client, Oid, PrivProtocol, Retry, UdpClient, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Credentials for one class of polled devices.
///
/// Values are passed to the agent as is; they are never logged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version", rename_all = "lowercase")]
pub enum SnmpAuth {
    /// Community-based SNMPv2c
    V2c { community: String },
    /// SNMPv3 USM with HMAC-SHA authentication and AES-128 privacy
    V3 {
        username: String,
        auth_key: String,
        priv_key: String,
    },
}

impl std::fmt::Debug for SnmpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnmpAuth::V2c { .. } => write!(f, "V2c {{ community: <redacted> }}"),
            SnmpAuth::V3 { username, .. } => {
                write!(f, "V3 {{ username: {:?}, keys: <redacted> }}", username)
            }
        }
    }
}

impl Default for SnmpAuth {
    fn default() -> Self {
        SnmpAuth::V2c {
            community: "public".to_string(),
        }
    }
}

impl SnmpAuth {
    fn to_client_auth(&self) -> Auth {
        match self {
            SnmpAuth::V2c { community } => Auth::v2c(community.clone()),
            SnmpAuth::V3 {
                username,
                auth_key,
                priv_key,
            } => Auth::usm(username.clone())
                .auth(AuthProtocol::Sha1, auth_key.clone())
                .privacy(PrivProtocol::Aes128, priv_key.clone())
                .into(),
        }
    }
}

/// Transport settings shared by every request of a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub port: u16,
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            port: 161,
            timeout: Duration::from_secs(5),
        }
    }
}

/// SNMP session over UDP. One client is kept per target address.
pub struct SnmpSession {
    auth: SnmpAuth,
    options: SessionOptions,
    clients: Mutex<HashMap<String, Arc<UdpClient>>>,
}

impl SnmpSession {
    pub fn new(auth: SnmpAuth, options: SessionOptions) -> Self {
        Self {
            auth,
            options,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client_for(&self, target: &str) -> Result<Arc<UdpClient>, SessionError> {
        if let Some(client) = self.clients.lock().await.get(target) {
            return Ok(client.clone());
        }

        let address = format!("{}:{}", target, self.options.port);
        tracing::debug!("Opening SNMP client for {}", address);

        let client = Client::builder(address, self.auth.to_client_auth())
            .timeout(self.options.timeout)
            .retry(retry_policy())
            .connect()
            .await
            .map_err(|e| map_error(target, e))?;

        let client = Arc::new(client);
        self.clients
            .lock()
            .await
            .insert(target.to_string(), client.clone());
        Ok(client)
    }
}

impl PollingSession for SnmpSession {
    async fn get_next(&self, target: &str, oid: &str) -> Result<Vec<VarBinding>, SessionError> {
        let request_oid = Oid::parse(oid).map_err(|e| SessionError::Transport {
            target: target.to_string(),
            message: format!("invalid request OID {}: {}", oid, e),
        })?;

        let client = self.client_for(target).await?;
        let varbind = client
            .get_next(&request_oid)
            .await
            .map_err(|e| map_error(target, e))?;

        tracing::trace!("{} GETNEXT {} -> {}", target, oid, varbind.oid);

        Ok(vec![VarBinding::new(
            varbind.oid.to_string(),
            convert_value(varbind.value),
        )])
    }
}

/// Requests are sent once; retrying is left to the next pass
fn retry_policy() -> Retry {
    Retry::none()
}

fn map_error(target: &str, error: async_snmp::Error) -> SessionError {
    match error {
        async_snmp::Error::Snmp { status, .. } => SessionError::Protocol {
            target: target.to_string(),
            status: format!("{:?}", status),
        },
        other => SessionError::Transport {
            target: target.to_string(),
            message: other.to_string(),
        },
    }
}

fn convert_value(value: Value) -> BindingValue {
    match value {
        Value::Integer(v) => BindingValue::Integer(i64::from(v)),
        Value::OctetString(bytes) => BindingValue::Octets(bytes.to_vec()),
        Value::EndOfMibView => BindingValue::EndOfMibView,
        Value::NoSuchObject | Value::NoSuchInstance => BindingValue::NoSuchObject,
        other => BindingValue::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_from_toml() {
        let v2: SnmpAuth = toml::from_str(
            r#"
version = "v2c"
community = "private"
"#,
        )
        .unwrap();
        assert_eq!(
            v2,
            SnmpAuth::V2c {
                community: "private".to_string()
            }
        );

        let v3: SnmpAuth = toml::from_str(
            r#"
version = "v3"
username = "poller"
auth_key = "authpass123"
priv_key = "privpass123"
"#,
        )
        .unwrap();
        assert!(matches!(v3, SnmpAuth::V3 { ref username, .. } if username == "poller"));
    }

    #[test]
    fn test_requests_are_not_retried() {
        assert_eq!(retry_policy().max_attempts, 0);
    }

    #[test]
    fn test_error_status_maps_to_protocol_fault() {
        let error = async_snmp::Error::Snmp {
            target: None,
            status: async_snmp::ErrorStatus::NoSuchName,
            index: 1,
            oid: None,
        };

        let mapped = map_error("10.0.0.1", error);
        assert!(matches!(
            mapped,
            SessionError::Protocol { ref target, .. } if target == "10.0.0.1"
        ));
    }

    #[test]
    fn test_convert_value() {
        assert_eq!(convert_value(Value::Integer(7)), BindingValue::Integer(7));
        assert_eq!(
            convert_value(Value::OctetString(vec![0xaa, 0xbb].into())),
            BindingValue::Octets(vec![0xaa, 0xbb])
        );
        assert_eq!(convert_value(Value::NoSuchInstance), BindingValue::NoSuchObject);
        assert_eq!(convert_value(Value::NoSuchObject), BindingValue::NoSuchObject);
        assert_eq!(convert_value(Value::EndOfMibView), BindingValue::EndOfMibView);
    }

    #[test]
    fn test_auth_debug_hides_secrets() {
        let auth = SnmpAuth::V3 {
            username: "poller".to_string(),
            auth_key: "authpass123".to_string(),
            priv_key: "privpass123".to_string(),
        };
        let printed = format!("{:?}", auth);
        assert!(printed.contains("poller"));
        assert!(!printed.contains("authpass123"));
        assert!(!printed.contains("privpass123"));
    }
}
