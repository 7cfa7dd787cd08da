use std::{
    net::{SocketAddr, TcpListener},
    process::{Child, Command, Stdio},
    time::Duration,
};
use tokio::{net::UdpSocket, time::sleep};

// Every variable the relay reads, so the caller's shell cannot leak into tests.
const RELAY_ENV: &[&str] = &[
    "RELAY_LISTEN_HOST",
    "WS_PORT",
    "RELAY_TARGET_MODE",
    "Q3_HOST",
    "Q3_PORT",
    "RCON_PASS",
    "POLL_MS",
    "RESP_TIMEOUT_MS",
    "CONSEC_REQUIRED",
    "RELAY_SERVERS_FILE",
    "MASTER_SERVER_URL",
    "HEARTBEAT_MS",
    "RELAY_TLS_CERT",
    "RELAY_TLS_KEY",
    "RELAY_LOG",
];

pub const HOST: &str = "127.0.0.1";

#[allow(dead_code)]
pub fn reserve_port() -> u16 {
    let listener = TcpListener::bind(format!("{HOST}:0")).expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

/// The relay binary, killed when dropped.
pub struct RelayProcess {
    child: Child,
    pub port: u16,
}

impl RelayProcess {
    #[allow(dead_code)]
    pub fn ws_url(&self, path_and_query: &str) -> String {
        format!("ws://{HOST}:{}{path_and_query}", self.port)
    }
}

impl Drop for RelayProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[allow(dead_code)]
pub async fn spawn_relay(envs: &[(&str, String)]) -> RelayProcess {
    let exe = env!("CARGO_BIN_EXE_q3relay");
    let port = reserve_port();

    let mut cmd = Command::new(exe);
    for name in RELAY_ENV {
        cmd.env_remove(name);
    }
    cmd.env("RELAY_LISTEN_HOST", HOST)
        .env("WS_PORT", port.to_string())
        .env("RELAY_LOG", "warn")
        .stdout(Stdio::null());
    for (name, value) in envs {
        cmd.env(name, value);
    }

    let child = cmd.spawn().expect("spawn q3relay");
    let relay = RelayProcess { child, port };
    wait_for_listen(port).await;
    relay
}

pub async fn wait_for_listen(port: u16) {
    let addr = format!("{HOST}:{port}");
    for _ in 0..100 {
        if std::net::TcpStream::connect(&addr).is_ok() {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("q3relay did not start listening on {addr}");
}

/// A UDP socket standing in for the game server.
pub struct FakeGameServer {
    pub socket: UdpSocket,
    pub port: u16,
}

impl FakeGameServer {
    #[allow(dead_code)]
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind(format!("{HOST}:0")).await.unwrap();
        let port = socket.local_addr().unwrap().port();
        Self { socket, port }
    }

    /// Next datagram, with a deadline so a broken relay fails the test instead
    /// of hanging it.
    #[allow(dead_code)]
    pub async fn recv(&self) -> (Vec<u8>, SocketAddr) {
        let mut buf = vec![0u8; 64 * 1024];
        let (n, from) = tokio::time::timeout(Duration::from_secs(5), self.socket.recv_from(&mut buf))
            .await
            .expect("no datagram within 5s")
            .unwrap();
        buf.truncate(n);
        (buf, from)
    }

    /// Text of the next out-of-band datagram, marker stripped.
    #[allow(dead_code)]
    pub async fn recv_oob(&self) -> (String, SocketAddr) {
        let (bytes, from) = self.recv().await;
        let payload = bytes.strip_prefix(&[0xFF; 4][..]).unwrap_or(&bytes);
        (String::from_utf8_lossy(payload).into_owned(), from)
    }

    #[allow(dead_code)]
    pub async fn send_oob(&self, text: &str, to: SocketAddr) {
        let mut packet = vec![0xFF; 4];
        packet.extend_from_slice(text.as_bytes());
        self.socket.send_to(&packet, to).await.unwrap();
    }
}
