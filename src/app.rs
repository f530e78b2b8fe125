use crate::errors::QurlError;
use crate::managers::request_node::{RequestNode, TriggerMessage};
use crate::services::config::QurlConfig;
use crate::services::logger::Logger;
use crate::services::profile::ProfileRegistry;
use crate::services::request_config::Overrides;
use crate::services::status::{LogStatusSink, StatusSink};
use crate::utils::paths::resolve_config_path;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

const RESULT_FIELD: &str = "qurl";
const ERROR_FIELD: &str = "error";

pub struct App {
    pub logger: Logger,
    pub registry: ProfileRegistry,
    pub node: RequestNode,
}

impl App {
    pub fn initialize(config_path: Option<PathBuf>, node_id: Option<&str>) -> Result<Self, QurlError> {
        let logger = Logger::new("qurl");
        let path = resolve_config_path(config_path);
        logger.debug(
            "loading config",
            Some(&serde_json::json!({ "path": path.display().to_string() })),
        );
        let config = QurlConfig::load(&path)?;
        Self::from_config(&config, node_id, logger)
    }

    /// Without an explicit id the file must define exactly one node.
    pub fn from_config(
        config: &QurlConfig,
        node_id: Option<&str>,
        logger: Logger,
    ) -> Result<Self, QurlError> {
        let node_id = match node_id {
            Some(id) => id.to_string(),
            None => {
                let mut ids = config.nodes.keys();
                match (ids.next(), ids.next()) {
                    (Some(only), None) => only.clone(),
                    _ => {
                        return Err(QurlError::invalid_params(
                            "Config must define exactly one node unless --node is given",
                        )
                        .with_hint("Pass --node <id>."))
                    }
                }
            }
        };
        let node_config = config.node(&node_id)?;

        let sink: Arc<dyn StatusSink> = Arc::new(LogStatusSink::new(&logger));
        let registry = ProfileRegistry::load(&config.endpoints, sink.as_ref());
        let node = RequestNode::new(
            &node_id,
            node_config,
            &registry,
            config.context(),
            sink,
            &logger,
        )?;
        logger.info(
            "node ready",
            Some(&serde_json::json!({
                "node": node_id,
                "deferred": node.is_deferred(),
                "endpoints": registry.ids(),
            })),
        );
        Ok(Self {
            logger,
            registry,
            node,
        })
    }

    /// Runs one event through the node and returns the outgoing event.
    /// Deferred mode invokes the attached callable with the event's own
    /// fields and stores the result under `qurl`.
    pub async fn process(&self, body: Map<String, Value>) -> Value {
        let mut message = TriggerMessage::new(body);
        let outcome = self.node.handle_input(&mut message).await;
        let mut out = message.body;

        if let Err(err) = outcome {
            out.insert(ERROR_FIELD.to_string(), error_value(&err));
            return Value::Object(out);
        }
        if let Some(bound) = message.qurl {
            match bound.invoke(Overrides::from_message(&out)).await {
                Ok(envelope) => match serde_json::to_value(envelope) {
                    Ok(result) => {
                        out.insert(RESULT_FIELD.to_string(), result);
                    }
                    Err(err) => {
                        out.insert(ERROR_FIELD.to_string(), error_value(&err.into()));
                    }
                },
                Err(err) => {
                    out.insert(ERROR_FIELD.to_string(), error_value(&err));
                }
            }
        }
        Value::Object(out)
    }

    pub async fn run_stdio(&self) -> Result<(), QurlError> {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin).lines();
        let mut writer = BufWriter::new(stdout);

        while let Some(line) = reader.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let output = match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(body)) => self.process(body).await,
                Ok(_) => serde_json::json!({
                    ERROR_FIELD: error_value(&QurlError::invalid_params("Event must be a JSON object")),
                }),
                Err(err) => serde_json::json!({
                    ERROR_FIELD: error_value(&QurlError::invalid_params(format!("Parse error: {}", err))),
                }),
            };

            let payload = serde_json::to_string(&output)?;
            writer.write_all(payload.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        self.logger.debug("stdin closed", Some(&self.logger.stats()));
        Ok(())
    }
}

fn error_value(err: &QurlError) -> Value {
    serde_json::to_value(err).unwrap_or_else(|_| Value::String(err.message.clone()))
}
