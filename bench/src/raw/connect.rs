//! Socket setup and the startup/authentication exchange for [`RawClient`].

use super::{server_error, RawClient};
use crate::error::ProtocolError;
use bench_core::config::ConnConfig;
use bytes::BytesMut;
use fallible_iterator::FallibleIterator;
use postgres_protocol::authentication::{self, sasl};
use postgres_protocol::message::backend::Message;
use postgres_protocol::message::frontend;
use std::io::{self, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// A blocking connection to the server: TCP, or a Unix socket when the
/// configured host is a directory path.
pub(crate) enum RawStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl RawStream {
    pub(crate) fn open(config: &ConnConfig) -> io::Result<Self> {
        if config.is_unix_socket() {
            #[cfg(unix)]
            {
                let path = format!("{}/.s.PGSQL.{}", config.host, config.port);
                return Ok(RawStream::Unix(UnixStream::connect(path)?));
            }
            #[cfg(not(unix))]
            {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "Unix sockets are not available on this platform",
                ));
            }
        }

        let stream = TcpStream::connect((config.host.as_str(), config.port))?;
        stream.set_nodelay(true)?;
        Ok(RawStream::Tcp(stream))
    }
}

impl Read for RawStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            RawStream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            RawStream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for RawStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            RawStream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            RawStream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            RawStream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            RawStream::Unix(s) => s.flush(),
        }
    }
}

impl RawClient {
    /// Send the startup packet and answer authentication requests until the
    /// server reports it is ready for the first query.
    pub(super) fn startup(&mut self, config: &ConnConfig) -> Result<(), ProtocolError> {
        let mut buf = BytesMut::new();
        frontend::startup_message(
            [
                ("user", config.user.as_str()),
                ("database", config.database.as_str()),
                ("application_name", "driver-bench"),
                ("client_encoding", "UTF8"),
            ],
            &mut buf,
        )?;
        self.stream.write_all(&buf)?;

        let password = || {
            config
                .password
                .as_deref()
                .map(str::as_bytes)
                .ok_or(ProtocolError::MissingPassword)
        };
        let mut scram: Option<sasl::ScramSha256> = None;

        loop {
            buf.clear();
            match self.read_message()? {
                Message::AuthenticationOk => {}
                Message::AuthenticationCleartextPassword => {
                    frontend::password_message(password()?, &mut buf)?;
                }
                Message::AuthenticationMd5Password(body) => {
                    let hash =
                        authentication::md5_hash(config.user.as_bytes(), password()?, body.salt());
                    frontend::password_message(hash.as_bytes(), &mut buf)?;
                }
                Message::AuthenticationSasl(body) => {
                    let mut mechanisms = body.mechanisms();
                    let mut offered = Vec::new();
                    while let Some(mechanism) = mechanisms.next()? {
                        offered.push(mechanism.to_string());
                    }
                    if !offered.iter().any(|m| m == sasl::SCRAM_SHA_256) {
                        return Err(ProtocolError::UnsupportedAuth(format!(
                            "SASL mechanisms {offered:?}"
                        )));
                    }
                    let state =
                        sasl::ScramSha256::new(password()?, sasl::ChannelBinding::unsupported());
                    frontend::sasl_initial_response(sasl::SCRAM_SHA_256, state.message(), &mut buf)?;
                    scram = Some(state);
                }
                Message::AuthenticationSaslContinue(body) => {
                    let state = scram.as_mut().ok_or(ProtocolError::Unexpected {
                        message: "AuthenticationSASLContinue",
                        during: "startup",
                    })?;
                    state.update(body.data())?;
                    frontend::sasl_response(state.message(), &mut buf)?;
                }
                Message::AuthenticationSaslFinal(body) => {
                    let state = scram.as_mut().ok_or(ProtocolError::Unexpected {
                        message: "AuthenticationSASLFinal",
                        during: "startup",
                    })?;
                    state.finish(body.data())?;
                }
                Message::AuthenticationKerberosV5
                | Message::AuthenticationScmCredential
                | Message::AuthenticationGss
                | Message::AuthenticationSspi => {
                    return Err(ProtocolError::UnsupportedAuth(
                        "Kerberos/SCM/GSS/SSPI".to_string(),
                    ));
                }
                Message::ParameterStatus(_)
                | Message::BackendKeyData(_)
                | Message::NoticeResponse(_) => {}
                Message::ErrorResponse(body) => return Err(server_error(&body)),
                Message::ReadyForQuery(_) => return Ok(()),
                _ => {
                    return Err(ProtocolError::Unexpected {
                        message: "non-startup message",
                        during: "startup",
                    })
                }
            }

            if !buf.is_empty() {
                self.stream.write_all(&buf)?;
            }
        }
    }
}
