use super::state::TelemetryState;
use crate::config::PrinterConfig;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Full status reports exceed the client's 10 KiB default
const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// MQTT transport feeding printer reports into a [`TelemetryState`].
///
/// The event loop reconnects on the next poll after an error; the report
/// topic is re-subscribed on every ConnAck so reconnects resume delivery.
pub struct MqttTelemetry {
    config: PrinterConfig,
    state: Arc<TelemetryState>,
}

impl MqttTelemetry {
    pub fn new(config: PrinterConfig, state: Arc<TelemetryState>) -> Self {
        Self { config, state }
    }

    /// Build client options for the printer's broker
    pub fn options(config: &PrinterConfig) -> MqttOptions {
        let client_id = format!("timelapser-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_credentials(config.username.clone(), config.access_code.clone());
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

        if config.tls {
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                Arc::new(insecure_tls_config()),
            )));
        }

        options
    }

    /// Run until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let topic = self.config.report_topic();
        let (client, mut eventloop) = AsyncClient::new(
            Self::options(&self.config),
            self.config.channel_capacity.max(1),
        );

        info!(
            "Connecting to printer MQTT broker {}:{} (topic {})",
            self.config.host, self.config.port, topic
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("MQTT telemetry cancelled");
                    let _ = client.try_disconnect();
                    break;
                }
                continue_polling = self.poll_once(&client, &mut eventloop, &topic, &cancel) => {
                    if !continue_polling {
                        break;
                    }
                }
            }
        }

        info!("MQTT telemetry stopped");
    }

    async fn poll_once(
        &self,
        client: &AsyncClient,
        eventloop: &mut EventLoop,
        topic: &str,
        cancel: &CancellationToken,
    ) -> bool {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected, subscribing to {}", topic);
                // try_subscribe: the request queue is drained by this same loop
                if let Err(e) = client.try_subscribe(topic, QoS::AtMostOnce) {
                    warn!("Failed to subscribe to {}: {}", topic, e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic != topic {
                    debug!("Ignoring message on {}", publish.topic);
                } else {
                    match std::str::from_utf8(&publish.payload) {
                        Ok(payload) => self.state.apply(payload),
                        Err(_) => warn!("Dropping non UTF-8 telemetry payload"),
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "MQTT connection error: {}; retrying in {:?}",
                    e,
                    self.config.reconnect_delay()
                );
                tokio::select! {
                    _ = cancel.cancelled() => return false,
                    _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
                }
            }
        }
        true
    }
}

/// TLS client config that accepts the printer's self-signed certificate
fn insecure_tls_config() -> ClientConfig {
    ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth()
}

#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
