use boardlink::config::Config;
use boardlink::frame::BoardEvent;
use boardlink::supervisor::{Mode, Supervisor};
use boardlink::token::load_or_create_token;
use tokio::sync::broadcast::{self, error::RecvError};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    let token = match load_or_create_token(&config.token_path) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "auth token unavailable");
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %config.bind_addr(), token_path = %config.token_path.display(), "boardlink starting");
    let supervisor = Supervisor::start(config, &token);
    let events = tokio::spawn(log_events(supervisor.subscribe()));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut modes = supervisor.watch_mode();
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "failed to listen for ctrl-c");
                }
                break;
            }
            changed = modes.changed() => {
                if changed.is_err() {
                    break;
                }
                let mode = modes.borrow_and_update().clone();
                tracing::info!(?mode, "mode changed");
                if mode == Mode::Server {
                    report_leadership(&supervisor).await;
                }
            }
        }
    }

    tracing::info!("boardlink stopping");
    events.abort();
    supervisor.shutdown().await;
}

/// Log the store summary on taking the lead and trace store changes after.
async fn report_leadership(supervisor: &Supervisor) {
    let Some(state) = supervisor.server_state().await else {
        return;
    };
    let mut store = state.store();
    tracing::info!(summary = ?store.summary(), "leading");
    store.subscribe(|event| tracing::debug!(?event, "store changed"));
}

async fn log_events(mut rx: broadcast::Receiver<BoardEvent>) {
    loop {
        match rx.recv().await {
            Ok(BoardEvent::Connect { board_info }) => {
                tracing::info!(board_id = %board_info.id, name = %board_info.name, "board connected");
            }
            Ok(BoardEvent::Disconnect {}) => tracing::info!("board disconnected"),
            Ok(BoardEvent::NavigateToCard { card }) => {
                tracing::info!(title = %card.title(), path = %card.path(), "navigate to card");
            }
            Ok(BoardEvent::UpdateCard { miro_link, card }) => {
                tracing::debug!(?miro_link, removed = card.is_none(), "card updated");
            }
            Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "event log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
