// Call a running service from scripts
//
// Each operation reads one JSON request from stdin and writes one JSON
// response to stdout.

use std::io::Read;

use clap::Subcommand;
use jasper_api::models::OutcomeResponse;
use jasper_api::RestClient;
use jasper_manager::Filter;
use jasper_process::{CreateOptions, ProcessInfo, Signal};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::Command;
use crate::error::{CliError, CliResult};

/// Operations available through `jasper client`
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOp {
    /// Create a process from creation options
    Create,
    /// List processes matching `{"filter": ...}`
    List,
    /// List processes carrying `{"tag": ...}`
    Group,
    /// Show the process `{"id": ...}`
    Get,
    /// Send `{"id": ..., "signal": <number>}`
    Signal,
    /// Wait for `{"id": ...}` to exit
    Wait,
    /// Start a copy of `{"id": ...}`
    Respawn,
    /// Add `{"id": ..., "tag": ...}`
    Tag,
    /// Show the tags of `{"id": ...}`
    GetTags,
    /// Drop the tags of `{"id": ...}`
    ResetTags,
    /// Evict finished processes
    Clear,
    /// Terminate every process
    Close,
    /// Show the manager ID
    Id,
}

impl ClientOp {
    /// Whether the operation reads a request from stdin.
    pub fn takes_request(self) -> bool {
        !matches!(self, ClientOp::Clear | ClientOp::Close | ClientOp::Id)
    }
}

#[derive(Debug, Deserialize)]
struct IdRequest {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FilterRequest {
    filter: Filter,
}

#[derive(Debug, Deserialize)]
struct GroupRequest {
    tag: String,
}

#[derive(Debug, Deserialize)]
struct SignalRequest {
    id: String,
    signal: i32,
}

#[derive(Debug, Deserialize)]
struct TagRequest {
    id: String,
    tag: String,
}

/// Response envelope written to stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
    #[serde(flatten)]
    pub outcome: OutcomeResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ProcessInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infos: Option<Vec<ProcessInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ClientResponse {
    pub fn ok() -> Self {
        Self::with_outcome(OutcomeResponse::ok())
    }

    fn with_outcome(outcome: OutcomeResponse) -> Self {
        Self {
            outcome,
            id: None,
            info: None,
            infos: None,
            tags: None,
            exit_code: None,
        }
    }

    /// The failure envelope for `err`. Failed waits keep their exit code.
    pub fn from_error(err: &CliError) -> Self {
        let mut response = Self::with_outcome(OutcomeResponse::failure(err.to_string()));
        if let CliError::ProcessFailed { exit_code, .. } = err {
            response.exit_code = Some(*exit_code);
        }
        response
    }

    fn info(info: ProcessInfo) -> Self {
        Self {
            info: Some(info),
            ..Self::ok()
        }
    }

    fn infos(infos: Vec<ProcessInfo>) -> Self {
        Self {
            infos: Some(infos),
            ..Self::ok()
        }
    }
}

/// Read the raw request for `op`. Operations without a request skip stdin.
pub fn read_request<R: Read>(op: ClientOp, mut reader: R) -> CliResult<String> {
    let mut input = String::new();
    if op.takes_request() {
        reader.read_to_string(&mut input)?;
    }
    Ok(input)
}

/// Decode a JSON request.
pub fn parse_request<T: DeserializeOwned>(input: &str) -> CliResult<T> {
    if input.trim().is_empty() {
        return Err(CliError::InvalidRequest {
            message: "expected a JSON request".to_string(),
        });
    }
    serde_json::from_str(input).map_err(|e| CliError::InvalidRequest {
        message: e.to_string(),
    })
}

/// `jasper client <op>`
pub struct ClientCommand {
    base_url: String,
    op: ClientOp,
}

impl ClientCommand {
    pub fn new(base_url: impl Into<String>, op: ClientOp) -> Self {
        Self {
            base_url: base_url.into(),
            op,
        }
    }

    /// Connect and perform the operation on `input`.
    pub async fn call(&self, input: &str) -> CliResult<ClientResponse> {
        let client = RestClient::connect(&self.base_url).await?;
        self.dispatch(&client, input).await
    }

    async fn dispatch(&self, client: &RestClient, input: &str) -> CliResult<ClientResponse> {
        let response = match self.op {
            ClientOp::Create => {
                let opts: CreateOptions = parse_request(input)?;
                ClientResponse::info(client.create(&opts).await?)
            }
            ClientOp::List => {
                let request: FilterRequest = parse_request(input)?;
                ClientResponse::infos(client.list_info(request.filter).await?)
            }
            ClientOp::Group => {
                let request: GroupRequest = parse_request(input)?;
                ClientResponse::infos(client.group_info(&request.tag).await?)
            }
            ClientOp::Get => {
                let request: IdRequest = parse_request(input)?;
                ClientResponse::info(client.process_info(&request.id).await?)
            }
            ClientOp::Signal => {
                let request: SignalRequest = parse_request(input)?;
                let signal =
                    Signal::from_wire(request.signal).map_err(|e| CliError::InvalidRequest {
                        message: e.to_string(),
                    })?;
                client.signal_process(&request.id, signal).await?;
                ClientResponse::ok()
            }
            ClientOp::Wait => {
                let request: IdRequest = parse_request(input)?;
                let waited = client.wait_process(&request.id).await?;
                if waited.error.is_some() || waited.exit_code != 0 {
                    return Err(CliError::ProcessFailed {
                        exit_code: waited.exit_code,
                        text: waited.error.unwrap_or_else(|| {
                            format!("process exited with code {}", waited.exit_code)
                        }),
                    });
                }
                ClientResponse {
                    exit_code: Some(waited.exit_code),
                    ..ClientResponse::ok()
                }
            }
            ClientOp::Respawn => {
                let request: IdRequest = parse_request(input)?;
                ClientResponse::info(client.respawn_process(&request.id).await?)
            }
            ClientOp::Tag => {
                let request: TagRequest = parse_request(input)?;
                client.add_tag(&request.id, &request.tag).await?;
                ClientResponse::ok()
            }
            ClientOp::GetTags => {
                let request: IdRequest = parse_request(input)?;
                ClientResponse {
                    tags: Some(client.get_tags(&request.id).await?),
                    ..ClientResponse::ok()
                }
            }
            ClientOp::ResetTags => {
                let request: IdRequest = parse_request(input)?;
                client.reset_tags(&request.id).await?;
                ClientResponse::ok()
            }
            ClientOp::Clear => {
                client.clear_processes().await?;
                ClientResponse::ok()
            }
            ClientOp::Close => {
                client.close_manager().await?;
                ClientResponse::ok()
            }
            ClientOp::Id => ClientResponse {
                id: Some(client.manager_id().await?),
                ..ClientResponse::ok()
            },
        };
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Command for ClientCommand {
    async fn execute(&self) -> CliResult<()> {
        let result = match read_request(self.op, std::io::stdin()) {
            Ok(input) => self.call(&input).await,
            Err(e) => Err(e),
        };

        let response = match &result {
            Ok(response) => response.clone(),
            Err(e) => ClientResponse::from_error(e),
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requests() {
        let request: SignalRequest = parse_request(r#"{"id": "p1", "signal": 15}"#).unwrap();
        assert_eq!(request.id, "p1");
        assert_eq!(request.signal, 15);

        let request: FilterRequest = parse_request(r#"{"filter": "running"}"#).unwrap();
        assert_eq!(request.filter, Filter::Running);

        let opts: CreateOptions =
            parse_request(r#"{"args": ["sleep", "1"], "timeout_secs": 5}"#).unwrap();
        assert_eq!(opts.args, vec!["sleep".to_string(), "1".to_string()]);
        assert_eq!(opts.timeout.as_secs(), 5);
    }

    #[test]
    fn test_bad_requests_are_invalid() {
        let err = parse_request::<IdRequest>("").unwrap_err();
        assert!(matches!(err, CliError::InvalidRequest { .. }));

        let err = parse_request::<FilterRequest>(r#"{"filter": "sleeping"}"#).unwrap_err();
        assert!(matches!(err, CliError::InvalidRequest { .. }));

        let err = parse_request::<IdRequest>("{not json").unwrap_err();
        assert!(matches!(err, CliError::InvalidRequest { .. }));
    }

    #[test]
    fn test_read_request_skips_stdin_for_bare_ops() {
        let input = read_request(ClientOp::Id, "ignored".as_bytes()).unwrap();
        assert!(input.is_empty());
        let input = read_request(ClientOp::Get, r#"{"id": "x"}"#.as_bytes()).unwrap();
        assert_eq!(input, r#"{"id": "x"}"#);
    }

    #[test]
    fn test_response_envelope_is_flat() {
        let response = ClientResponse {
            tags: Some(vec!["a".into()]),
            ..ClientResponse::ok()
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["tags"][0], "a");
        assert!(value.get("info").is_none());

        let failed = ClientResponse::from_error(&CliError::ProcessFailed {
            exit_code: 2,
            text: "process exited with code 2".into(),
        });
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["exit_code"], 2);
        assert_eq!(value["text"], "process exited with code 2");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let cmd = ClientCommand::new("http://127.0.0.1:1", ClientOp::Id);
        assert!(cmd.call("").await.is_err());
    }
}
