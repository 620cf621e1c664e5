use clap::Parser;
use rand::Rng;
use shared::{FrameDecoder, Message, Role, SessionId, Vector2};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

const RETRY_INTERVAL: Duration = Duration::from_millis(500);
const MAX_ATTEMPTS: usize = 20;

/// Connects to a running relay and plays a scripted round
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Relay address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,
    /// Join this session as secondary instead of creating one
    #[clap(short, long)]
    join: Option<SessionId>,
    /// Number of paddle updates to send once the game starts
    #[clap(short, long, default_value = "10")]
    updates: u32,
}

struct Probe {
    socket: UdpSocket,
    server: SocketAddr,
    decoder: FrameDecoder,
}

impl Probe {
    async fn send(&self, message: &Message) -> Result<(), Box<dyn std::error::Error>> {
        self.socket.send_to(&message.encode()?, self.server).await?;
        Ok(())
    }

    /// Collects whatever arrives within `wait`. An empty result means silence.
    async fn recv(&mut self, wait: Duration) -> Result<Vec<Message>, Box<dyn std::error::Error>> {
        let mut buf = [0u8; 2048];
        let len = match timeout(wait, self.socket.recv_from(&mut buf)).await {
            Ok(received) => received?.0,
            Err(_) => return Ok(Vec::new()),
        };

        Ok(self
            .decoder
            .push(&buf[..len])
            .iter()
            .filter_map(|frame| Message::from_frame(frame).ok())
            .collect())
    }

    /// Resends `request` until a reply satisfies `accept`.
    async fn request<F>(
        &mut self,
        request: Message,
        mut accept: F,
    ) -> Result<Message, Box<dyn std::error::Error>>
    where
        F: FnMut(&Message) -> bool,
    {
        for _ in 0..MAX_ATTEMPTS {
            self.send(&request).await?;
            for reply in self.recv(RETRY_INTERVAL).await? {
                println!("  <- {:?}", reply);
                if accept(&reply) {
                    return Ok(reply);
                }
            }
        }
        Err(format!("no answer to {:?}", request.packet_type()).into())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let mut probe = Probe {
        socket,
        server: args.server,
        decoder: FrameDecoder::new(),
    };

    println!("Connecting to {}", args.server);
    let client_id = match probe
        .request(Message::Connect, |m| {
            matches!(m, Message::Connected { .. } | Message::CouldNotConnect)
        })
        .await?
    {
        Message::Connected { client_id } => client_id,
        _ => return Err("server is full".into()),
    };
    println!("Connected with client ID: {}", client_id);

    let request = match args.join {
        Some(session_id) => Message::AssignToSession {
            session_id,
            client_id,
        },
        None => Message::CreateSession { client_id },
    };
    let (session_id, role) = match probe
        .request(request, |m| match m {
            Message::AssignedToSession { client_id: id, .. } => *id == client_id,
            Message::CouldNotAssignToSession { .. } | Message::CouldNotCreateSession => true,
            _ => false,
        })
        .await?
    {
        Message::AssignedToSession {
            session_id, role, ..
        } => (session_id, role),
        other => return Err(format!("could not get a session: {:?}", other).into()),
    };
    println!("In session {} as {:?}", session_id, role);

    println!("Waiting for the game to start");
    let ready = Message::SetReady {
        session_id,
        client_id,
        ready: true,
    };
    loop {
        let started = probe
            .request(ready.clone(), |m| matches!(m, Message::GameStarted { .. }))
            .await;
        if started.is_ok() {
            break;
        }
        probe.send(&Message::ImAlive).await?;
    }

    let mut rng = rand::thread_rng();
    let mut paddle_y = 300.0f32;
    let mut ball = Vector2::new(400.0, 300.0);
    let ball_direction = Vector2::new(1.0, 0.5);

    for _ in 0..args.updates {
        paddle_y += rng.gen_range(-20.0..20.0);
        probe
            .send(&Message::SetPlayerPos {
                client_id,
                position: Vector2::new(20.0, paddle_y),
                direction: Vector2::new(0.0, paddle_y.signum()),
            })
            .await?;

        if role == Role::Main {
            ball = Vector2::new(
                ball.x + ball_direction.x * 10.0,
                ball.y + ball_direction.y * 10.0,
            );
            probe
                .send(&Message::SetBallPos {
                    client_id,
                    position: ball,
                    direction: ball_direction,
                })
                .await?;
        }

        for message in probe.recv(Duration::from_millis(100)).await? {
            println!("  <- {:?}", message);
        }
        sleep(Duration::from_millis(100)).await;
    }

    println!("Leaving session {}", session_id);
    probe
        .request(
            Message::DisconnectFromSession {
                session_id,
                client_id,
            },
            |m| {
                matches!(m, Message::SessionDisconnectStatus { client_id: id, .. } if *id == client_id)
            },
        )
        .await?;

    probe.send(&Message::Disconnect { client_id }).await?;
    println!("Probe client finished");

    Ok(())
}
