//! Scripted in-process event-socket server for tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::target::Target;

pub const PASSWORD: &str = "ClueCon";

pub const STATUS_BODY: &str = "UP 0 years, 0 days, 1 hour, 0 minutes, 5 seconds, 0 milliseconds, 0 microseconds
FreeSWITCH (Version 1.10.9-release 64bit) is ready
57 session(s) since startup
2 session(s) - peak 9, last 5min 3
0 session(s) per Sec out of max 30, peak 4, last 5min 1
1000 session(s) max
min idle cpu 0.00/98.50
Current Stack Size/Max 240K/8192K
";

pub const SOFIA_BODY: &str = "                     Name\t   Type\t                                       Data\tState
=================================================================================================
            external\tprofile\t          sip:mod_sofia@10.0.0.1:5080\tRUNNING (1)
  external::carrier-a\tgateway\t                sip:trunk@carrier-a.example\tREGED
            internal\tprofile\t          sip:mod_sofia@10.0.0.1:5060\tRUNNING (1)
=================================================================================================
2 profiles 0 aliases
";

pub const CHANNELS_JSON: &str = r#"{"row_count":1,"rows":[{"uuid":"leg-1","direction":"inbound","callstate":"ACTIVE","read_codec":"PCMU","write_codec":"PCMU"}]}"#;

pub const DUMP_JSON: &str = r#"{"Unique-ID":"leg-1","variable_rtp_audio_in_raw_bytes":"17200","variable_rtp_audio_in_mos":"4.50","variable_rtp_audio_out_packet_count":"100"}"#;

#[derive(Debug, Clone)]
enum Reply {
    Body(String),
    Hang,
}

/// Builder for a [`FakeSbc`].
#[derive(Debug, Clone)]
pub struct FakeSbcBuilder {
    password: String,
    replies: HashMap<String, Reply>,
    silent: bool,
}

impl FakeSbcBuilder {
    /// Answer `api <command>` with `body`.
    pub fn reply(mut self, command: &str, body: &str) -> Self {
        self.replies
            .insert(command.to_string(), Reply::Body(body.to_string()));
        self
    }

    /// Never answer `api <command>`.
    pub fn hang(mut self, command: &str) -> Self {
        self.replies.insert(command.to_string(), Reply::Hang);
        self
    }

    /// Answer `api <command>` with `-ERR`.
    pub fn fail(self, command: &str) -> Self {
        self.reply(command, &format!("-ERR {} Command not found!\n", command))
    }

    /// Accept connections but never send the greeting.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Accept a different password.
    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub async fn start(self) -> FakeSbc {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let script = Arc::new(self);
        let commands = Arc::new(Mutex::new(Vec::new()));

        let log = commands.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, script.clone(), log.clone()));
            }
        });

        FakeSbc { addr, commands }
    }
}

/// A running fake SBC.
pub struct FakeSbc {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeSbc {
    /// A server that answers every baseline and RTP query.
    pub fn builder() -> FakeSbcBuilder {
        FakeSbcBuilder {
            password: PASSWORD.to_string(),
            replies: HashMap::new(),
            silent: false,
        }
        .reply("status", STATUS_BODY)
        .reply("show calls count", "\n1 total.\n")
        .reply("show channels count", "\n2 total.\n")
        .reply("show registrations count", "\n3 total.\n")
        .reply("sofia status", SOFIA_BODY)
        .reply("show channels as json", CHANNELS_JSON)
        .reply("uuid_set_media_stats leg-1", "+OK\n")
        .reply("uuid_dump leg-1 json", DUMP_JSON)
    }

    pub fn target(&self) -> Target {
        Target::new("127.0.0.1", self.addr.port())
    }

    pub fn uri(&self) -> String {
        self.target().to_string()
    }

    /// Commands received so far, across all connections.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

/// A port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn serve(stream: TcpStream, script: Arc<FakeSbcBuilder>, log: Arc<Mutex<Vec<String>>>) {
    let mut io = BufReader::new(stream);

    if script.silent {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        return;
    }

    if io
        .get_mut()
        .write_all(b"Content-Type: auth/request\n\n")
        .await
        .is_err()
    {
        return;
    }

    while let Some(command) = read_command(&mut io).await {
        log.lock().push(command.clone());

        let reply = if let Some(password) = command.strip_prefix("auth ") {
            if password == script.password {
                "Content-Type: command/reply\nReply-Text: +OK accepted\n\n".to_string()
            } else {
                let _ = io
                    .get_mut()
                    .write_all(
                        b"Content-Type: command/reply\nReply-Text: -ERR invalid\n\n\
                          Content-Type: text/disconnect-notice\nContent-Length: 0\n\n",
                    )
                    .await;
                return;
            }
        } else if command == "exit" {
            let _ = io
                .get_mut()
                .write_all(b"Content-Type: command/reply\nReply-Text: +OK bye\n\n")
                .await;
            return;
        } else if let Some(api) = command.strip_prefix("api ") {
            let body = match script.replies.get(api) {
                Some(Reply::Body(body)) => body.clone(),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    return;
                }
                None => format!("-ERR {} Command not found!\n", api),
            };
            format!(
                "Content-Type: api/response\nContent-Length: {}\n\n{}",
                body.len(),
                body
            )
        } else {
            "Content-Type: command/reply\nReply-Text: -ERR command not found\n\n".to_string()
        };

        if io.get_mut().write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

async fn read_command(io: &mut BufReader<TcpStream>) -> Option<String> {
    let mut command = String::new();
    loop {
        let mut line = String::new();
        match io.read_line(&mut line).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        let line = line.trim_end();
        if line.is_empty() {
            if command.is_empty() {
                continue;
            }
            return Some(command);
        }
        command.push_str(line);
    }
}
