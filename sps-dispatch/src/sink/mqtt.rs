use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, QoS};
use serde_json::{Map, Value};
use sps_core::{Measurement, Reading};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::{ReadingSink, SinkError};
use crate::config::MqttConfig;

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(3);
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes each reading as a JSON record to an MQTT topic.
///
/// Every publish opens its own short-lived connection, and is skipped when
/// the broker cannot be reached.
pub struct MqttSink {
    config: MqttConfig,
}

impl MqttSink {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    async fn reachable(&self) -> bool {
        let addr = (self.config.host.as_str(), self.config.port);
        match tokio::time::timeout(REACHABILITY_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(error = %e, host = %self.config.host, "Broker refused connection");
                false
            }
            Err(_) => false,
        }
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), SinkError> {
        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(Duration::from_secs(5));
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        client
            .publish(&self.config.topic, QoS::AtMostOnce, false, payload)
            .await?;
        client.disconnect().await?;

        let drive = async {
            loop {
                match eventloop.poll().await? {
                    Event::Outgoing(Outgoing::Disconnect) => return Ok::<(), SinkError>(()),
                    event => debug!(?event, "MQTT event"),
                }
            }
        };

        tokio::time::timeout(PUBLISH_TIMEOUT, drive)
            .await
            .map_err(|_| SinkError::Timeout)?
    }
}

/// The JSON record published for `reading`.
pub fn record(reading: &Reading) -> Value {
    let mut map = Map::new();
    map.insert("sensor".into(), Value::String(reading.sensor.to_string()));
    map.insert("time".into(), Value::String(reading.formatted_time()));

    for (label, value) in Measurement::LABELS.iter().zip(reading.measurement.formatted()) {
        map.insert((*label).into(), Value::String(value));
    }

    map.insert("type".into(), Value::String("json".into()));
    Value::Object(map)
}

#[async_trait]
impl ReadingSink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn accept(&self, reading: &Reading) -> Result<(), SinkError> {
        if !self.reachable().await {
            return Err(SinkError::Unreachable {
                host: self.config.host.clone(),
                port: self.config.port,
            });
        }

        let payload = serde_json::to_vec(&record(reading))?;
        self.publish(payload).await?;

        info!(topic = %self.config.topic, sensor = %reading.sensor, "Published reading");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use jiff::tz::TimeZone;
    use sps_core::SensorName;

    use super::*;

    #[test]
    fn record_has_all_fields_as_strings() {
        let timestamp = Timestamp::from_second(1_592_140_000)
            .unwrap()
            .to_zoned(TimeZone::UTC);
        let reading = Reading::new(
            &SensorName::from_serial("Q9"),
            timestamp,
            Measurement::from_values([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 0.5]),
        );

        let record = record(&reading);
        let object = record.as_object().unwrap();

        assert_eq!(object.len(), 13);
        assert_eq!(object["sensor"], "SPS_Q9");
        assert_eq!(object["time"], "06/14/20 13:06:40");
        assert_eq!(object["PM25"], "2.00");
        assert_eq!(object["b0310"], "9.00");
        assert_eq!(object["tsize"], "0.50");
        assert_eq!(object["type"], "json");
    }

    #[tokio::test]
    async fn unreachable_broker_is_reported() {
        // Bind then drop to get a local port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let sink = MqttSink::new(MqttConfig {
            host: "127.0.0.1".into(),
            port,
            topic: "sensor/sps30".into(),
            client_id: "test".into(),
            username: None,
            password: None,
        });

        let reading = Reading::new(
            &SensorName::Unresolved,
            jiff::Zoned::now(),
            Measurement::zeroed(),
        );
        let err = sink.accept(&reading).await.unwrap_err();
        assert!(matches!(err, SinkError::Unreachable { .. }));
    }
}
