use std::error::Error;
use std::rc::Rc;

use scoreboard_sync::bus::LocalEventBus;
use scoreboard_sync::config::{SyncConfig, record_id_from_env};
use scoreboard_sync::http::{HttpRecordStore, PollingFeed};
use scoreboard_sync::record::RecordId;
use scoreboard_sync::remote::RemoteSubscriber;
use scoreboard_sync::view::RecordView;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SyncConfig::from_env()?;
    let record_id = record_id_from_env()?;

    LocalSet::new().run_until(watch(config, record_id)).await
}

async fn watch(config: SyncConfig, record_id: RecordId) -> Result<(), Box<dyn Error>> {
    let store = Rc::new(HttpRecordStore::new(&config)?);
    let feed = Rc::new(PollingFeed::new(Rc::clone(&store), config.poll_interval));
    let remote = RemoteSubscriber::new(feed, store.clone(), config.resubscribe);
    let bus = LocalEventBus::new();

    let view = RecordView::mount(record_id, &bus, &remote, store).await?;
    tracing::info!(%record_id, table = %config.table, "watching scoreboard");

    let mut seen = None;
    let mut tick = tokio::time::interval(config.poll_interval);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let revision = view.revision();
                if seen != Some(revision) {
                    seen = Some(revision);
                    let shown = view.displayed();
                    tracing::info!(
                        revision,
                        name = ?shown.name.flatten(),
                        a_side = ?shown.a_side,
                        b_side = ?shown.b_side,
                        a_score = ?shown.a_score,
                        b_score = ?shown.b_score,
                        livestream = ?shown.livestream_enabled,
                        updated_at = ?shown.updated_at,
                        "scoreboard changed"
                    );
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    view.unmount();
    Ok(())
}
