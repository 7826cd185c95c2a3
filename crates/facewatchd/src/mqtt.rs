//! MQTT transport: client setup, Home Assistant discovery and the event loop.

use crate::config::MqttConfig;
use crate::sink::Publisher;
use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions,
    Outgoing, Packet, QoS,
};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

const REQUEST_CAPACITY: usize = 32;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Home Assistant MQTT discovery config for a sensor.
#[derive(Debug, Serialize)]
pub struct HaSensorConfig {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_attributes_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,
    pub icon: String,
    pub availability_topic: String,
    pub payload_available: String,
    pub payload_not_available: String,
    pub device: HaDeviceInfo,
}

/// Home Assistant device info shared by all three sensors.
#[derive(Debug, Clone, Serialize)]
pub struct HaDeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
}

/// Discovery topics and configs for the status, door and alert sensors.
pub fn discovery_configs(cfg: &MqttConfig) -> Vec<(String, HaSensorConfig)> {
    let device = HaDeviceInfo {
        identifiers: vec![cfg.node_id.clone()],
        name: "Câmera de Reconhecimento Facial".to_string(),
        model: "PC Webcam".to_string(),
        manufacturer: "DIY".to_string(),
    };

    let sensor = |object_id: &str, name: &str, state_topic: &str, icon: &str| {
        let topic = format!(
            "{}/sensor/{}/{}/config",
            cfg.discovery_prefix, cfg.node_id, object_id
        );
        let config = HaSensorConfig {
            name: name.to_string(),
            unique_id: format!("{}_{}", cfg.node_id, object_id),
            state_topic: state_topic.to_string(),
            json_attributes_topic: None,
            value_template: None,
            icon: icon.to_string(),
            availability_topic: cfg.availability_topic.clone(),
            payload_available: PAYLOAD_ONLINE.to_string(),
            payload_not_available: PAYLOAD_OFFLINE.to_string(),
            device: device.clone(),
        };
        (topic, config)
    };

    let status = sensor(
        "status",
        "Último Rosto Reconhecido",
        &cfg.state_topic,
        "mdi:face-recognition",
    );

    let mut door = sensor(
        "door_command",
        "Comando Porta Reconhecimento Facial",
        &cfg.door_topic,
        "mdi:door",
    );
    door.1.value_template =
        Some("{% if value_json.command == 'open' %}ABERTA{% else %}FECHADA{% endif %}".to_string());
    door.1.json_attributes_topic = Some(cfg.door_topic.clone());

    let mut alert = sensor(
        "unknown_alert",
        "Alerta Rosto Desconhecido",
        &cfg.alert_topic,
        "mdi:alert",
    );
    alert.1.value_template = Some("{{ value_json.message }}".to_string());
    alert.1.json_attributes_topic = Some(cfg.alert_topic.clone());

    vec![status, door, alert]
}

/// Build client options with an `offline` last will on the availability topic.
pub fn options(cfg: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
    options.set_keep_alive(Duration::from_secs(60));
    if let Some(user) = &cfg.username {
        options.set_credentials(user, cfg.password.clone().unwrap_or_default());
    }
    options.set_last_will(LastWill::new(
        &cfg.availability_topic,
        PAYLOAD_OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));
    options
}

pub fn connect(cfg: &MqttConfig) -> (AsyncClient, EventLoop) {
    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        auth = cfg.username.is_some(),
        "connecting to MQTT broker"
    );
    AsyncClient::new(options(cfg), REQUEST_CAPACITY)
}

/// Queues without waiting: while the broker is unreachable the event loop
/// stops draining requests, and a full queue fails the publish instead.
impl Publisher for AsyncClient {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<(), ClientError>> + Send {
        std::future::ready(self.try_publish(topic, QoS::AtLeastOnce, retain, payload))
    }
}

/// Queue availability and discovery messages without waiting on the
/// request channel (called from the task that drains it).
fn announce(client: &AsyncClient, cfg: &MqttConfig) {
    let mut messages: Vec<(String, Vec<u8>)> = Vec::new();
    if cfg.discovery {
        for (topic, config) in discovery_configs(cfg) {
            match serde_json::to_vec(&config) {
                Ok(json) => messages.push((topic, json)),
                Err(e) => tracing::warn!(topic = %topic, error = %e, "failed to encode discovery config"),
            }
        }
    }
    messages.push((cfg.availability_topic.clone(), PAYLOAD_ONLINE.as_bytes().to_vec()));

    for (topic, payload) in messages {
        if let Err(e) = client.try_publish(&topic, QoS::AtLeastOnce, true, payload) {
            tracing::warn!(topic = %topic, error = %e, "failed to queue announcement");
        }
    }
    tracing::info!(discovery = cfg.discovery, "announced availability");
}

/// Drive the MQTT connection until the client disconnects.
///
/// Every successful connection acknowledgement republishes discovery and
/// `online`; connection errors are retried after a fixed back-off.
pub async fn run_event_loop(mut eventloop: EventLoop, client: AsyncClient, cfg: MqttConfig) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    tracing::info!("connected to MQTT broker");
                    announce(&client, &cfg);
                } else {
                    tracing::warn!(code = ?ack.code, "MQTT broker refused connection");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::info!("MQTT client disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, delay_secs = RECONNECT_DELAY.as_secs(), "MQTT connection error; retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Queue the `offline` status and a disconnect. Never waits on the request
/// queue; if it is full the broker falls back to the last will.
pub fn shutdown(client: &AsyncClient, cfg: &MqttConfig) {
    if let Err(e) = client.try_publish(&cfg.availability_topic, QoS::AtLeastOnce, true, PAYLOAD_OFFLINE) {
        tracing::warn!(error = %e, "failed to queue offline status");
    }
    if let Err(e) = client.try_disconnect() {
        tracing::warn!(error = %e, "failed to queue MQTT disconnect");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_topics() {
        let cfg = MqttConfig::default();
        let topics: Vec<_> = discovery_configs(&cfg).into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            topics,
            vec![
                "homeassistant/sensor/facial_recognition_cam/status/config",
                "homeassistant/sensor/facial_recognition_cam/door_command/config",
                "homeassistant/sensor/facial_recognition_cam/unknown_alert/config",
            ]
        );
    }

    #[test]
    fn test_discovery_payloads() {
        let cfg = MqttConfig::default();
        let configs = discovery_configs(&cfg);
        let json: Vec<serde_json::Value> = configs
            .iter()
            .map(|(_, c)| serde_json::to_value(c).unwrap())
            .collect();

        assert_eq!(json[0]["state_topic"], "face_recognition/status");
        assert!(json[0].get("value_template").is_none());
        assert_eq!(json[1]["json_attributes_topic"], "face_recognition/door_control");
        assert!(json[1]["value_template"].as_str().unwrap().contains("ABERTA"));
        assert_eq!(json[2]["value_template"], "{{ value_json.message }}");
        assert_eq!(json[2]["icon"], "mdi:alert");

        for entry in &json {
            assert_eq!(entry["availability_topic"], "face_recognition/availability");
            assert_eq!(entry["device"]["identifiers"][0], "facial_recognition_cam");
        }
    }

    #[test]
    fn test_discovery_follows_config() {
        let cfg = MqttConfig {
            discovery_prefix: "ha".to_string(),
            node_id: "porch".to_string(),
            state_topic: "porch/status".to_string(),
            ..Default::default()
        };
        let (topic, config) = &discovery_configs(&cfg)[0];
        assert_eq!(topic, "ha/sensor/porch/status/config");
        assert_eq!(config.unique_id, "porch_status");
        assert_eq!(config.state_topic, "porch/status");
    }

    #[test]
    fn test_options_carry_credentials() {
        let cfg = MqttConfig {
            username: Some("cam".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let opts = options(&cfg);
        assert_eq!(opts.broker_address(), ("127.0.0.1".to_string(), 1883));
        assert_eq!(opts.client_id(), "facewatch");
        assert_eq!(opts.credentials(), Some(("cam".to_string(), "secret".to_string())));
        let will = opts.last_will().unwrap();
        assert_eq!(will.topic, "face_recognition/availability");
        assert!(will.retain);
    }

    fn unreachable_client() -> (AsyncClient, EventLoop, MqttConfig) {
        let cfg = MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Default::default()
        };
        let (client, eventloop) = AsyncClient::new(options(&cfg), 2);
        (client, eventloop, cfg)
    }

    fn fill_queue(client: &AsyncClient) {
        while client
            .try_publish("face_recognition/status", QoS::AtLeastOnce, true, "x")
            .is_ok()
        {}
    }

    #[tokio::test]
    async fn test_shutdown_returns_with_full_request_queue() {
        // The event loop is never polled, so nothing drains the queue.
        let (client, _eventloop, cfg) = unreachable_client();
        fill_queue(&client);

        let done = tokio::time::timeout(Duration::from_secs(2), async { shutdown(&client, &cfg) }).await;
        assert!(done.is_ok(), "shutdown must not wait on the request queue");
    }

    #[tokio::test]
    async fn test_publisher_fails_fast_with_full_request_queue() {
        let (client, _eventloop, _cfg) = unreachable_client();
        fill_queue(&client);

        let publish = Publisher::publish(&client, "face_recognition/alert", b"{}".to_vec(), false);
        let result = tokio::time::timeout(Duration::from_secs(2), publish)
            .await
            .expect("publish must not block on a full queue");
        assert!(result.is_err());
    }
}
