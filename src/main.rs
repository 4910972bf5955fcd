use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, unbounded, Receiver};
use dialoguer::{theme::ColorfulTheme, Input};
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use soniclink::device::jack::{connect_physical_ports, register_link_ports, server_sample_rate};
use soniclink::error::LinkError;
use soniclink::frame::{encode_frame_bits, FrameDecoder};
use soniclink::link::{
    build_process_closure, AcousticLink, InviteDetails, LinkConfig, LinkEvent, LinkShared,
};
use soniclink::modem::{ModemMode, ToneDetector, ToneGenerator};
use soniclink::session::{Datagram, Effect, RoomOptions, SessionManager};
use soniclink::ui;
use soniclink::utils::consts::*;
use soniclink::utils::logging::init_logging;
use soniclink::utils::settings::{generate_user_id, sanitize_username, settings_path, Settings};

#[derive(Parser)]
#[command(name = "soniclink")]
#[command(about = "Ultrasonic peer discovery and chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (the default)
    Chat {
        /// FSK profile (high or low)
        #[arg(long, default_value = "high")]
        mode: String,

        /// Output volume, 0-100
        #[arg(long, default_value_t = 80)]
        volume: u8,

        /// Display name (persisted for next time)
        #[arg(long)]
        name: Option<String>,

        /// Join this room immediately
        #[arg(long)]
        room: Option<String>,

        /// Do not start discovery until /start is issued
        #[arg(long)]
        no_auto: bool,
    },

    /// Decode-only monitor: print every datagram heard
    Listen {
        /// FSK profile (high or low)
        #[arg(long, default_value = "high")]
        mode: String,

        /// Stop after this many seconds (0 = run until killed)
        #[arg(short = 'd', long, default_value_t = 0)]
        duration: u64,
    },

    /// Render a single frame to the speaker and exit
    Send {
        /// Chat text; without --room a heartbeat announcement is sent
        text: String,

        /// FSK profile (high or low)
        #[arg(long, default_value = "high")]
        mode: String,

        /// Output volume, 0-100
        #[arg(long, default_value_t = 80)]
        volume: u8,

        /// Room to address the chat to
        #[arg(long)]
        room: Option<String>,
    },

    /// Offline loopback self-test (no audio device needed)
    Test {
        /// FSK profile (high or low)
        #[arg(long, default_value = "high")]
        mode: String,
    },
}

fn parse_mode(mode: &str) -> ModemMode {
    match ModemMode::from_name(mode) {
        Some(mode) => mode,
        None => {
            warn!("Unknown mode '{}', defaulting to high", mode);
            ModemMode::High
        }
    }
}

fn main() {
    init_logging();
    ui::print_banner();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Chat {
        mode: "high".to_string(),
        volume: 80,
        name: None,
        room: None,
        no_auto: false,
    });

    let outcome = match command {
        Commands::Chat {
            mode,
            volume,
            name,
            room,
            no_auto,
        } => run_chat(parse_mode(&mode), volume, name, room, no_auto),
        Commands::Listen { mode, duration } => run_listen(parse_mode(&mode), duration),
        Commands::Send {
            text,
            mode,
            volume,
            room,
        } => run_send(&text, parse_mode(&mode), volume, room),
        Commands::Test { mode } => {
            run_test(parse_mode(&mode));
            Ok(())
        }
    };

    if let Err(e) = outcome {
        error!("{}", e);
        std::process::exit(1);
    }
    info!("Exiting gracefully...");
}

/// Bring up the JACK client, hand the shared state and capture stream to
/// `run`, and tear the client down afterwards.
fn with_audio<F>(run: F) -> soniclink::Result<()>
where
    F: FnOnce(LinkShared, Receiver<Vec<f32>>, f32) -> soniclink::Result<()>,
{
    let client_name = format!(
        "{}_{:04}",
        JACK_CLIENT_NAME,
        rand::rng().random_range(0..10000)
    );
    let (client, status) =
        jack::Client::new(&client_name, jack::ClientOptions::NO_START_SERVER)
            .map_err(|e| LinkError::DeviceUnavailable(e.to_string()))?;
    info!("JACK client status: {:?}", status);

    let sample_rate = server_sample_rate(&client);

    let shared = LinkShared::new();
    let (capture_tx, capture_rx) = bounded::<Vec<f32>>(64);

    let (in_port, out_port) = register_link_ports(&client)
        .map_err(|e| LinkError::DeviceUnavailable(e.to_string()))?;

    let in_port_name = in_port
        .name()
        .map_err(|e| LinkError::DeviceUnavailable(e.to_string()))?;
    let out_port_name = out_port
        .name()
        .map_err(|e| LinkError::DeviceUnavailable(e.to_string()))?;

    let process_cb = build_process_closure(in_port, out_port, shared.clone(), capture_tx);
    let process = jack::ClosureProcessHandler::new(process_cb);

    let active_client = client
        .activate_async((), process)
        .map_err(|e| LinkError::DeviceUnavailable(e.to_string()))?;

    connect_physical_ports(
        active_client.as_client(),
        in_port_name.as_str(),
        out_port_name.as_str(),
    );

    let result = run(shared, capture_rx, sample_rate);

    if let Err(err) = active_client.deactivate() {
        error!("Error deactivating client: {}", err);
    }
    result
}

fn run_chat(
    mode: ModemMode,
    volume: u8,
    name: Option<String>,
    room: Option<String>,
    no_auto: bool,
) -> soniclink::Result<()> {
    let path = settings_path();
    let mut settings = Settings::load(&path);
    if let Some(name) = name {
        settings.username = sanitize_username(&name);
        if let Err(e) = settings.save(&path) {
            warn!("Could not persist settings: {}", e);
        }
    }
    let user_id = generate_user_id();
    info!("You are {} ({})", settings.username, user_id);

    with_audio(move |shared, capture_rx, sample_rate| {
        let (event_tx, event_rx) = unbounded::<LinkEvent>();

        let mut config = LinkConfig::new(user_id, settings.username.clone());
        config.mode = mode;
        config.volume = volume;
        config.sample_rate = sample_rate;
        config.auto_discovery = !no_auto;

        let mut link = AcousticLink::new(config, shared, capture_rx, event_tx);
        if link.auto_discovery() {
            link.start_discovery()?;
        } else {
            info!("Discovery not started; use /start");
        }

        if let Some(room_id) = room {
            link.create_or_join_room(RoomOptions {
                room_id: Some(room_id),
                ..Default::default()
            });
        }

        // Everything observable arrives on one channel; this thread is
        // the only writer to the terminal besides the prompt.
        let last_invite: Arc<Mutex<Option<InviteDetails>>> = Arc::new(Mutex::new(None));
        let printer_invite = last_invite.clone();
        let printer = thread::spawn(move || {
            while let Ok(event) = event_rx.recv() {
                if let LinkEvent::InviteReceived(invite) = &event {
                    *printer_invite.lock().unwrap() = Some(invite.clone());
                }
                if let Some(line) = ui::render_event(&event) {
                    println!("{}", line);
                }
            }
        });

        chat_repl(&mut link, &last_invite);

        link.stop_discovery();
        drop(link);
        let _ = printer.join();
        Ok(())
    })
}

/// The interactive loop: plain lines go to the room, slash commands
/// drive the façade.
fn chat_repl(link: &mut AcousticLink, last_invite: &Arc<Mutex<Option<InviteDetails>>>) {
    let theme = ColorfulTheme::default();
    println!("Type /help for commands.");

    loop {
        let line: String = match Input::with_theme(&theme)
            .with_prompt(">")
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            Err(e) => {
                warn!("Input closed: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let mut parts = command.splitn(2, ' ');
            let verb = parts.next().unwrap_or("");
            let arg = parts.next().unwrap_or("").trim();

            match verb {
                "quit" | "exit" => break,
                "help" => print_help(),
                "start" => {
                    if let Err(e) = link.start_discovery() {
                        error!("{}", e);
                    }
                }
                "stop" => link.stop_discovery(),
                "peers" => println!("{}", ui::render_peer_list(&link.list_peers())),
                "room" => link.create_or_join_room(RoomOptions::default()),
                "join" => {
                    if arg.is_empty() {
                        println!("usage: /join <room-id>");
                    } else {
                        link.create_or_join_room(RoomOptions {
                            room_id: Some(arg.to_string()),
                            ..Default::default()
                        });
                    }
                }
                "invite" => {
                    if arg.is_empty() {
                        println!("usage: /invite <user-id>");
                    } else {
                        // Failures already surface on the event channel.
                        let _ = link.invite_peer(arg);
                    }
                }
                "accept" => {
                    let invite = last_invite.lock().unwrap().take();
                    match invite {
                        Some(invite) => link.accept_invite(&invite),
                        None => println!("no pending invite"),
                    }
                }
                "leave" => link.leave_room(),
                "private" => {
                    if let Err(e) = link.toggle_privacy() {
                        error!("{}", e);
                    }
                }
                "mode" => match ModemMode::from_name(arg) {
                    Some(mode) => link.set_mode(mode),
                    None => println!("usage: /mode high|low"),
                },
                "volume" => match arg.parse::<u8>() {
                    Ok(volume) => link.set_volume(volume),
                    Err(_) => println!("usage: /volume 0-100"),
                },
                other => println!("unknown command /{}", other),
            }
            continue;
        }

        // Plain text: a chat line. Errors surface on the event channel.
        let _ = link.send_chat(line);
    }
}

fn print_help() {
    println!("  /peers            list peers in earshot");
    println!("  /room             create a public room");
    println!("  /join <id>        join an advertised room");
    println!("  /invite <uid>     invite a peer into the room");
    println!("  /accept           accept the latest invite");
    println!("  /leave            leave the room");
    println!("  /private          toggle private mode");
    println!("  /mode high|low    switch FSK profile");
    println!("  /volume 0-100     set output volume");
    println!("  /start, /stop     control discovery");
    println!("  /quit             exit");
}

fn run_listen(mode: ModemMode, duration: u64) -> soniclink::Result<()> {
    let path = settings_path();
    let settings = Settings::load(&path);
    let user_id = generate_user_id();

    with_audio(move |shared, capture_rx, sample_rate| {
        info!("=== Monitor Mode ===");
        let (event_tx, event_rx) = unbounded::<LinkEvent>();

        let mut config = LinkConfig::new(user_id, settings.username.clone());
        config.mode = mode;
        config.sample_rate = sample_rate;

        let mut link = AcousticLink::new(config, shared, capture_rx, event_tx);
        link.start_discovery()?;

        let deadline = (duration > 0).then(|| Instant::now() + Duration::from_secs(duration));
        loop {
            match event_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(event) => {
                    if let Some(line) = ui::render_event(&event) {
                        println!("{}", line);
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
        }

        link.stop_discovery();
        Ok(())
    })
}

fn run_send(
    text: &str,
    mode: ModemMode,
    volume: u8,
    room: Option<String>,
) -> soniclink::Result<()> {
    let path = settings_path();
    let settings = Settings::load(&path);
    let user_id = generate_user_id();
    let text = text.to_string();

    with_audio(move |shared, _capture_rx, sample_rate| {
        let mut session = SessionManager::new(user_id, settings.username.clone());

        let datagram = match room {
            Some(room_id) => {
                session.create_or_join_room(RoomOptions {
                    room_id: Some(room_id),
                    ..Default::default()
                });
                session.build_chat(&text)?.0
            }
            None => session.heartbeat(),
        };

        let profile = mode.profile();
        let wire = datagram.encode_wire()?;
        let bits = encode_frame_bits(wire.as_bytes())?;
        let generator = ToneGenerator::new(sample_rate);
        let samples = generator.render(&bits, &profile, volume.min(100) as f32 / 100.0);

        info!(
            "Transmitting {} bits ({:.1} s of airtime at {} bit/s)",
            bits.len(),
            generator.duration_secs(bits.len(), &profile),
            profile.bit_rate
        );

        let total_samples = samples.len() as u64;
        shared.begin_playback(samples);
        ui::progress::watch_transmit(&shared, total_samples, "sending");
        Ok(())
    })
}

/// Offline self-test: two in-memory endpoints, a heartbeat and a chat
/// pushed through render -> detect -> deframe -> dispatch.
fn run_test(mode: ModemMode) {
    info!("=== Offline Loopback Test ({} profile) ===", mode.name());

    let sample_rate = SAMPLE_RATE as f32;
    let profile = mode.profile();
    let generator = ToneGenerator::new(sample_rate);

    let mut alice = SessionManager::new("aaaa00000", "alice");
    let mut bob = SessionManager::new("bbbb11111", "bob");
    alice.create_or_join_room(RoomOptions {
        room_id: Some("rtest".to_string()),
        ..Default::default()
    });
    bob.create_or_join_room(RoomOptions {
        room_id: Some("rtest".to_string()),
        ..Default::default()
    });

    let heartbeat = alice.heartbeat();
    let (chat, _echo) = alice.build_chat("hello").expect("in a room");

    let mut transmitted = Vec::new();
    for datagram in [&heartbeat, &chat] {
        let wire = datagram.encode_wire().expect("datagram fits a frame");
        let bits = encode_frame_bits(wire.as_bytes()).expect("payload within bounds");
        transmitted.extend(generator.render(&bits, &profile, 0.8));
    }

    info!(
        "Rendered {} samples ({:.2} seconds at {} Hz)",
        transmitted.len(),
        transmitted.len() as f32 / sample_rate,
        sample_rate as u32
    );

    let mut detector = ToneDetector::matched(profile, sample_rate);
    let mut decoder = FrameDecoder::new();

    let mut received = Vec::new();
    for chunk in transmitted.chunks(1024) {
        let bits: Vec<u8> = detector.process(chunk).iter().map(|e| e.value).collect();
        for payload in decoder.push_bits(&bits) {
            let text = String::from_utf8(payload).expect("wire text is UTF-8");
            received.push(Datagram::parse_wire(&text).expect("wire parses"));
        }
    }

    info!("Decoded {} datagrams", received.len());

    let mut chat_seen = false;
    let mut peer_seen = false;
    for datagram in received {
        for effect in bob.handle_datagram(datagram, Instant::now()) {
            match effect {
                Effect::Emit(LinkEvent::PeerSeen { username, .. }) => {
                    info!("bob discovered {}", username);
                    peer_seen = true;
                }
                Effect::Emit(LinkEvent::MessageReceived(message)) => {
                    info!("bob received: {}", ui::render_message(&message));
                    chat_seen = message.content == "hello";
                }
                _ => {}
            }
        }
    }

    if peer_seen && chat_seen {
        info!("Loopback test PASSED");
    } else {
        error!(
            "Loopback test FAILED (peer_seen={}, chat_seen={})",
            peer_seen, chat_seen
        );
    }
}
