//! One authenticated connection to one broker.
//!
//! The restore path only ever issues a handful of request kinds (metadata,
//! produce, topic creation and the SASL exchange), each as a blocking
//! request/response pair. Requests on the same client are serialized.

use bytes::{BufMut, Bytes, BytesMut};
use kafka_protocol::messages::{
    ApiKey, RequestHeader, ResponseHeader, SaslAuthenticateRequest, SaslAuthenticateResponse,
    SaslHandshakeRequest, SaslHandshakeResponse,
};
use kafka_protocol::protocol::{Decodable, Encodable, StrBytes};
use socket2::{SockRef, TcpKeepalive};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

use crate::config::{ConnectionConfig, KafkaConfig, SaslMechanism, SecurityConfig};
use crate::error::KafkaError;
use crate::Result;

const CLIENT_ID: &str = "kafka-restore";

/// Request versions this client speaks. Metadata v9 and CreateTopics v5
/// need Kafka 2.4 or newer.
pub(crate) fn api_version(api_key: ApiKey) -> i16 {
    match api_key {
        ApiKey::Metadata => 9,
        ApiKey::Produce => 8,
        ApiKey::SaslHandshake => 1,
        ApiKey::SaslAuthenticate => 2,
        ApiKey::CreateTopics => 5,
        _ => 0,
    }
}

/// Length-prefixed request frame: size, header, body.
pub(crate) fn encode_frame<Req: Encodable>(
    api_key: ApiKey,
    correlation_id: i32,
    request: &Req,
) -> Result<BytesMut> {
    let version = api_version(api_key);
    let header = RequestHeader::default()
        .with_request_api_key(api_key as i16)
        .with_request_api_version(version)
        .with_correlation_id(correlation_id)
        .with_client_id(Some(StrBytes::from_static_str(CLIENT_ID)));

    let mut frame = BytesMut::new();
    frame.put_i32(0);
    header
        .encode(&mut frame, api_key.request_header_version(version))
        .map_err(|e| KafkaError::Protocol(format!("Failed to encode header: {:?}", e)))?;
    request
        .encode(&mut frame, version)
        .map_err(|e| KafkaError::Protocol(format!("Failed to encode request: {:?}", e)))?;

    let size = (frame.len() - 4) as i32;
    frame[0..4].copy_from_slice(&size.to_be_bytes());
    Ok(frame)
}

/// Decode a response body (the frame without its size prefix).
pub(crate) fn decode_frame<Resp: Decodable>(
    api_key: ApiKey,
    correlation_id: i32,
    mut body: Bytes,
) -> Result<Resp> {
    let version = api_version(api_key);
    let header = ResponseHeader::decode(&mut body, api_key.response_header_version(version))
        .map_err(|e| KafkaError::Protocol(format!("Failed to decode response header: {:?}", e)))?;
    if header.correlation_id != correlation_id {
        return Err(KafkaError::Protocol(format!(
            "Response correlation id {} does not match request {}",
            header.correlation_id, correlation_id
        ))
        .into());
    }
    Resp::decode(&mut body, version)
        .map_err(|e| KafkaError::Protocol(format!("Failed to decode response: {:?}", e)).into())
}

/// Apply keepalive and nodelay settings to a freshly dialed socket.
fn tune_socket(stream: &TcpStream, settings: &ConnectionConfig) -> std::io::Result<()> {
    let sock = SockRef::from(stream);
    if settings.tcp_nodelay {
        sock.set_nodelay(true)?;
    }
    if settings.tcp_keepalive {
        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(settings.keepalive_time_secs))
            .with_interval(Duration::from_secs(settings.keepalive_interval_secs));
        sock.set_tcp_keepalive(&keepalive)?;
    }
    Ok(())
}

enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    async fn exchange(&mut self, frame: &[u8]) -> std::io::Result<Bytes> {
        match self {
            Transport::Plain(s) => exchange(s, frame).await,
            Transport::Tls(s) => exchange(s.as_mut(), frame).await,
        }
    }
}

async fn exchange<S>(stream: &mut S, frame: &[u8]) -> std::io::Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(frame).await?;
    let size = stream.read_i32().await?;
    if size < 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("negative response size {}", size),
        ));
    }
    let mut body = vec![0u8; size as usize];
    stream.read_exact(&mut body).await?;
    Ok(Bytes::from(body))
}

async fn dial(
    server: &str,
    config: &KafkaConfig,
    tls: Option<&Arc<ClientConfig>>,
) -> Result<Transport> {
    let failed = |message: String| KafkaError::ConnectionFailed {
        broker: server.to_string(),
        message,
    };

    let tcp = TcpStream::connect(server)
        .await
        .map_err(|e| failed(e.to_string()))?;
    tune_socket(&tcp, &config.connection)
        .map_err(|e| failed(format!("Failed to tune socket: {}", e)))?;

    if !config.security.uses_tls() {
        return Ok(Transport::Plain(tcp));
    }

    let tls = tls.cloned().ok_or_else(|| {
        KafkaError::TlsConfig(format!(
            "{:?} requires a TLS client configuration",
            config.security.security_protocol
        ))
    })?;
    let host = server.rsplit_once(':').map_or(server, |(host, _)| host);
    let name = ServerName::try_from(host.to_string())
        .map_err(|e| failed(format!("Invalid server name for TLS: {}", e)))?;
    let stream = TlsConnector::from(tls)
        .connect(name, tcp)
        .await
        .map_err(|e| failed(format!("TLS handshake failed: {}", e)))?;
    debug!("TLS session established with {}", server);
    Ok(Transport::Tls(Box::new(stream)))
}

pub struct KafkaClient {
    address: String,
    transport: Mutex<Transport>,
    correlation_id: AtomicI32,
}

impl KafkaClient {
    /// Dial the first reachable address in `servers` and authenticate.
    ///
    /// A missing TLS configuration fails immediately instead of moving on to
    /// the next server.
    pub async fn connect(
        servers: &[String],
        config: &KafkaConfig,
        tls: Option<&Arc<ClientConfig>>,
    ) -> Result<Self> {
        for server in servers {
            let transport = match dial(server, config, tls).await {
                Ok(transport) => transport,
                Err(e @ crate::Error::Kafka(KafkaError::TlsConfig(_))) => return Err(e),
                Err(e) => {
                    debug!("Failed to connect to {}: {}", server, e);
                    continue;
                }
            };

            let client = Self {
                address: server.clone(),
                transport: Mutex::new(transport),
                correlation_id: AtomicI32::new(1),
            };
            client.authenticate(&config.security).await?;
            debug!("Connected to Kafka broker {}", server);
            return Ok(client);
        }

        Err(KafkaError::NoBrokersAvailable.into())
    }

    /// Address this client is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn authenticate(&self, security: &SecurityConfig) -> Result<()> {
        let Some(SaslMechanism::Plain) = security.sasl_mechanism else {
            return Ok(());
        };

        let _: SaslHandshakeResponse = self
            .send_request(
                ApiKey::SaslHandshake,
                SaslHandshakeRequest::default().with_mechanism("PLAIN".into()),
            )
            .await?;

        // authzid NUL username NUL password
        let mut token = vec![0u8];
        token.extend_from_slice(security.sasl_username.as_deref().unwrap_or("").as_bytes());
        token.push(0);
        token.extend_from_slice(security.sasl_password.as_deref().unwrap_or("").as_bytes());

        let response: SaslAuthenticateResponse = self
            .send_request(
                ApiKey::SaslAuthenticate,
                SaslAuthenticateRequest::default().with_auth_bytes(Bytes::from(token)),
            )
            .await?;
        if response.error_code != 0 {
            return Err(crate::Error::Authentication(format!(
                "SASL authentication with {} failed: {}",
                self.address,
                response
                    .error_message
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("error code {}", response.error_code))
            )));
        }

        debug!("SASL PLAIN authentication with {} succeeded", self.address);
        Ok(())
    }

    /// Send one request and wait for its response.
    pub async fn send_request<Req, Resp>(&self, api_key: ApiKey, request: Req) -> Result<Resp>
    where
        Req: Encodable,
        Resp: Decodable,
    {
        let correlation_id = self.correlation_id.fetch_add(1, Ordering::Relaxed);
        let frame = encode_frame(api_key, correlation_id, &request)?;
        trace!(
            "{:?} request {} to {} ({} bytes)",
            api_key,
            correlation_id,
            self.address,
            frame.len()
        );

        let body = self
            .transport
            .lock()
            .await
            .exchange(&frame)
            .await
            .map_err(|e| {
                KafkaError::Protocol(format!(
                    "{:?} exchange with {} failed: {}",
                    api_key, self.address, e
                ))
            })?;

        decode_frame(api_key, correlation_id, body)
    }
}
