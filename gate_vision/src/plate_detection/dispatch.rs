use std::time::Duration;

use chrono::Local;
use reqwest::blocking::Client;
use rumqttc::{Client as MqttClient, Event, MqttOptions, Outgoing, QoS};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, trace};

use super::{PlateSighting, TriggerEvent};
use crate::error::DeliveryError;

/// Performs the access side effect. Delivery is best effort, at most once.
pub trait ActionDispatcher {
    fn dispatch(&mut self, event: &TriggerEvent) -> Result<(), DeliveryError>;

    /// Status update for every plate decision. Ignored unless the transport
    /// has somewhere to put it.
    fn report(&mut self, _sighting: &PlateSighting) -> Result<(), DeliveryError> {
        Ok(())
    }
}

impl<D: ActionDispatcher + ?Sized> ActionDispatcher for Box<D> {
    fn dispatch(&mut self, event: &TriggerEvent) -> Result<(), DeliveryError> {
        (**self).dispatch(event)
    }

    fn report(&mut self, sighting: &PlateSighting) -> Result<(), DeliveryError> {
        (**self).report(sighting)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ActionSettings {
    Log,
    Webhook {
        url: String,
        #[serde(default)]
        http_method: HttpMethod,
        #[serde(default = "default_webhook_timeout")]
        timeout_secs: u64,
    },
    Mqtt(MqttSettings),
}

impl Default for ActionSettings {
    fn default() -> Self {
        ActionSettings::Log
    }
}

fn default_webhook_timeout() -> u64 {
    5
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub topic: String,
    pub payload: String,
    /// Retained JSON describing the last plate seen. Empty disables it.
    pub status_topic: String,
    pub client_id: String,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: String::new(),
            port: 1883,
            user: None,
            password: None,
            topic: "gate/control".to_string(),
            payload: "ON".to_string(),
            status_topic: "gatevision/last_plate".to_string(),
            client_id: "gate_vision".to_string(),
        }
    }
}

pub fn build_dispatcher(settings: &ActionSettings) -> Result<Box<dyn ActionDispatcher>, DeliveryError> {
    Ok(match settings {
        ActionSettings::Log => Box::new(LogDispatcher),
        ActionSettings::Webhook {
            url,
            http_method,
            timeout_secs,
        } => Box::new(WebhookDispatcher::new(
            url.clone(),
            http_method.clone(),
            Duration::from_secs(*timeout_secs),
        )?),
        ActionSettings::Mqtt(mqtt) => Box::new(MqttDispatcher::new(mqtt.clone())),
    })
}

/// Dry run: logs what would have been sent.
#[derive(Default)]
pub struct LogDispatcher;

impl ActionDispatcher for LogDispatcher {
    fn dispatch(&mut self, event: &TriggerEvent) -> Result<(), DeliveryError> {
        info!(plate = %event.plate, token = %event.token, confidence = event.confidence, "dry run: access granted");
        Ok(())
    }
}

pub struct WebhookDispatcher {
    client: Client,
    url: String,
    method: HttpMethod,
}

impl WebhookDispatcher {
    pub fn new(url: String, method: HttpMethod, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            method,
        })
    }
}

impl ActionDispatcher for WebhookDispatcher {
    fn dispatch(&mut self, event: &TriggerEvent) -> Result<(), DeliveryError> {
        let request = match self.method {
            HttpMethod::Get => self.client.get(&self.url),
            HttpMethod::Post => self.client.post(&self.url).json(event),
        };
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status));
        }
        info!(plate = %event.plate, %status, "webhook delivered");
        Ok(())
    }
}

/// Opens a short MQTT session per message, like a relay controller expects.
pub struct MqttDispatcher {
    settings: MqttSettings,
}

impl MqttDispatcher {
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings }
    }

    fn publish(&self, messages: Vec<(String, bool, Vec<u8>)>) -> Result<(), DeliveryError> {
        let mut options = MqttOptions::new(
            self.settings.client_id.clone(),
            self.settings.broker.clone(),
            self.settings.port,
        );
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(user), Some(password)) = (&self.settings.user, &self.settings.password) {
            if !user.is_empty() {
                options.set_credentials(user.clone(), password.clone());
            }
        }

        let (client, mut connection) = MqttClient::new(options, 10);
        for (topic, retain, payload) in messages {
            client.publish(topic, QoS::AtLeastOnce, retain, payload)?;
        }
        client.disconnect()?;

        for notification in connection.iter() {
            match notification? {
                Event::Outgoing(Outgoing::Disconnect) => break,
                event => trace!(?event, "mqtt"),
            }
        }
        Ok(())
    }

    fn status_message(&self, sighting: &PlateSighting) -> Result<Option<(String, bool, Vec<u8>)>, DeliveryError> {
        if self.settings.status_topic.is_empty() {
            return Ok(None);
        }
        let body = json!({
            "plate": sighting.plate.as_deref().unwrap_or(&sighting.token),
            "token": sighting.token,
            "status": if sighting.authorized { "authorized" } else { "unknown" },
            "confidence": sighting.confidence,
            "time": Local::now().format("%H:%M:%S").to_string(),
        });
        Ok(Some((
            self.settings.status_topic.clone(),
            true,
            serde_json::to_vec(&body)?,
        )))
    }
}

impl ActionDispatcher for MqttDispatcher {
    fn dispatch(&mut self, event: &TriggerEvent) -> Result<(), DeliveryError> {
        self.publish(vec![(
            self.settings.topic.clone(),
            false,
            self.settings.payload.clone().into_bytes(),
        )])?;
        info!(plate = %event.plate, topic = %self.settings.topic, "mqtt command published");
        Ok(())
    }

    fn report(&mut self, sighting: &PlateSighting) -> Result<(), DeliveryError> {
        if let Some(message) = self.status_message(sighting)? {
            self.publish(vec![message])?;
            debug!(token = %sighting.token, "mqtt status published");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn event() -> TriggerEvent {
        TriggerEvent {
            plate: "AB-123-CD".to_string(),
            token: "AB123CD".to_string(),
            timestamp: Duration::from_secs(12),
            confidence: 0.6,
            similarity: 1.0,
        }
    }

    /// Accepts one request, answers with `status`, returns the raw request.
    fn one_shot_server(status: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/gate", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            socket
                .set_read_timeout(Some(Duration::from_millis(500)))
                .unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        request.extend_from_slice(&buf[..n]);
                        let text = String::from_utf8_lossy(&request);
                        if let Some(head_end) = text.find("\r\n\r\n") {
                            let length = text[..head_end]
                                .lines()
                                .find_map(|l| {
                                    l.to_ascii_lowercase()
                                        .strip_prefix("content-length:")
                                        .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                                })
                                .unwrap_or(0);
                            if request.len() >= head_end + 4 + length {
                                break;
                            }
                        }
                    }
                }
            }
            let reply = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(reply.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (url, handle)
    }

    #[test]
    fn webhook_post_sends_event_json() {
        let (url, server) = one_shot_server("200 OK");
        let mut dispatcher =
            WebhookDispatcher::new(url, HttpMethod::Post, Duration::from_secs(2)).unwrap();
        dispatcher.dispatch(&event()).unwrap();

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /gate"));
        assert!(request.contains("\"plate\":\"AB-123-CD\""));
        assert!(request.contains("\"timestamp\":12.0"));
    }

    #[test]
    fn webhook_error_status_is_a_delivery_error() {
        let (url, server) = one_shot_server("500 Internal Server Error");
        let mut dispatcher =
            WebhookDispatcher::new(url, HttpMethod::Get, Duration::from_secs(2)).unwrap();
        let err = dispatcher.dispatch(&event()).unwrap_err();
        assert!(matches!(err, DeliveryError::Status(s) if s.as_u16() == 500));
        assert!(server.join().unwrap().starts_with("GET /gate"));
    }

    #[test]
    fn mqtt_unreachable_broker_fails_delivery() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut dispatcher = MqttDispatcher::new(MqttSettings {
            broker: "127.0.0.1".to_string(),
            port,
            ..MqttSettings::default()
        });
        assert!(dispatcher.dispatch(&event()).is_err());
    }

    #[test]
    fn status_message_is_retained_json() {
        let dispatcher = MqttDispatcher::new(MqttSettings::default());
        let sighting = PlateSighting {
            token: "ZZ000ZZ".to_string(),
            plate: None,
            authorized: false,
            confidence: 0.9,
            timestamp: Duration::from_secs(20),
        };
        let (topic, retain, payload) = dispatcher.status_message(&sighting).unwrap().unwrap();
        assert_eq!(topic, "gatevision/last_plate");
        assert!(retain);
        let body: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(body["plate"], "ZZ000ZZ");
        assert_eq!(body["status"], "unknown");

        let silent = MqttDispatcher::new(MqttSettings {
            status_topic: String::new(),
            ..MqttSettings::default()
        });
        assert!(silent.status_message(&sighting).unwrap().is_none());
    }

    #[test]
    fn action_settings_parse_by_method() {
        let mqtt: ActionSettings =
            toml::from_str("method = \"mqtt\"\nbroker = \"core-mosquitto\"\n").unwrap();
        match mqtt {
            ActionSettings::Mqtt(m) => {
                assert_eq!(m.broker, "core-mosquitto");
                assert_eq!(m.port, 1883);
                assert_eq!(m.payload, "ON");
            }
            other => panic!("unexpected {other:?}"),
        }

        let hook: ActionSettings = toml::from_str(
            "method = \"webhook\"\nurl = \"http://relay/open\"\nhttp_method = \"POST\"\n",
        )
        .unwrap();
        assert!(matches!(
            hook,
            ActionSettings::Webhook { http_method: HttpMethod::Post, timeout_secs: 5, .. }
        ));
    }
}
