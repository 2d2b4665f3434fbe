use std::io;
use std::time::{Duration, Instant};

use ratatui::backend::CrosstermBackend;
use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing::{debug, info};

use soundtab_popup::connection::{connection_handler, DaemonMessage};
use soundtab_popup::state::{Control, PopupState};
use soundtab_popup::ui;
use soundtab_proto::config::Config;
use soundtab_proto::protocol::Request;

enum AppMessage {
    Event(Event),
    Daemon(DaemonMessage),
}

enum KeyAction {
    Quit,
    Up,
    Down,
    Press(Control),
}

fn key_action(key: KeyEvent) -> Option<KeyAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::Quit)
        }
        KeyCode::Up | KeyCode::Char('k') => Some(KeyAction::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(KeyAction::Down),
        KeyCode::Char(' ') => Some(KeyAction::Press(Control::PlayPause)),
        KeyCode::Char('m') => Some(KeyAction::Press(Control::Mute)),
        KeyCode::Char('n') => Some(KeyAction::Press(Control::Next)),
        KeyCode::Char('p') => Some(KeyAction::Press(Control::Previous)),
        KeyCode::Enter => Some(KeyAction::Press(Control::Focus)),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = soundtab_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("popup.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let log_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,soundtab_popup=debug".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    let config = Config::load().unwrap_or_default();
    let daemon_addr = format!("{}:{}", config.popup.bind_address, config.popup.port);
    info!("soundtab popup starting, daemon at {}", daemon_addr);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run(&mut terminal, daemon_addr).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    daemon_addr: String,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<AppMessage>(256);

    let event_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
        match event::read() {
            Ok(ev) => {
                if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });

    let (daemon_tx, mut daemon_rx) = mpsc::channel::<DaemonMessage>(256);
    let (cmd_tx, cmd_rx) = mpsc::channel::<Request>(32);
    tokio::spawn(connection_handler(daemon_addr, daemon_tx, cmd_rx));

    let forward_tx = tx.clone();
    tokio::spawn(async move {
        while let Some(msg) = daemon_rx.recv().await {
            if forward_tx.send(AppMessage::Daemon(msg)).await.is_err() {
                break;
            }
        }
    });

    let mut state = PopupState::new();
    let mut tick = tokio::time::interval(Duration::from_millis(100));

    loop {
        terminal.draw(|f| ui::draw(f, &state))?;

        tokio::select! {
            _ = tick.tick() => {
                state.tick(Instant::now());
            }
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    AppMessage::Event(Event::Key(key)) => match key_action(key) {
                        Some(KeyAction::Quit) => break,
                        Some(KeyAction::Up) => state.select_prev(),
                        Some(KeyAction::Down) => state.select_next(),
                        Some(KeyAction::Press(control)) => {
                            if let Some(request) = state.begin(control, Instant::now()) {
                                debug!("sending {:?}", request.command);
                                if cmd_tx.send(request).await.is_err() {
                                    state.disconnected(Instant::now());
                                }
                            }
                        }
                        None => {}
                    },
                    AppMessage::Event(_) => {}
                    AppMessage::Daemon(msg) => apply_daemon_message(&mut state, msg),
                }
            }
        }
    }

    info!("soundtab popup exiting");
    Ok(())
}

fn apply_daemon_message(state: &mut PopupState, msg: DaemonMessage) {
    match msg {
        DaemonMessage::Hello(snapshot) => state.apply_hello(snapshot),
        DaemonMessage::TabsChanged(snapshot) => {
            if !state.apply_snapshot(snapshot) {
                debug!("dropped stale snapshot");
            }
        }
        DaemonMessage::Response { id, reply } => state.complete(id, &reply, Instant::now()),
        DaemonMessage::Log(line) => state.push_log(line),
        DaemonMessage::Disconnected(reason) => {
            state.disconnected(Instant::now());
            state.push_log(format!("daemon connection lost: {}", reason));
        }
    }
}
