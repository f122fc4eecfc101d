use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rb_core::{Error, PaperWithAnalysis, Result, SearchRequest, SearchSession, SessionStore};
use tokio::task::JoinHandle;

use crate::AppState;

fn request_of(session: &SearchSession) -> SearchRequest {
    SearchRequest {
        query: session.query.clone(),
        sources: session.sources.clone(),
        max_results: session.max_results,
        sort_by: session.sort_by,
        date_range: session.date_range,
        generate_analysis: session.generate_analysis,
        dedupe: session.dedupe,
    }
}

/// Drive one session from `pending` to a terminal state.
pub async fn run_search(state: Arc<AppState>, mut session: SearchSession) {
    let session_id = session.session_id.clone();
    if let Err(e) = execute(&state, &mut session).await {
        match e {
            Error::NotFound(_) => tracing::debug!("Session {} was deleted while running", session_id),
            e => tracing::error!("Search session {} could not be recorded: {}", session_id, e),
        }
    }
}

async fn execute(state: &AppState, session: &mut SearchSession) -> Result<()> {
    session.start()?;
    state.store.update_session(session).await?;

    let request = request_of(session);
    let result = state.aggregator.search(&request, &session.user_id).await;

    let every_source_failed =
        !result.outcomes.is_empty() && result.failed_sources().count() == result.outcomes.len();
    if result.papers.is_empty() && every_source_failed {
        let reasons: Vec<String> = result
            .failed_sources()
            .map(|o| format!("{}: {}", o.source, o.error.as_deref().unwrap_or("unknown error")))
            .collect();
        session.fail(format!("All sources failed ({})", reasons.join("; ")))?;
    } else {
        let papers = if session.generate_analysis {
            state.analysis.analyze_batch(result.papers).await
        } else {
            result.papers.into_iter().map(PaperWithAnalysis::bare).collect()
        };
        session.complete(papers)?;
    }

    state.store.update_session(session).await?;
    tracing::info!(
        "Session {} {} with {} papers",
        session.session_id,
        session.status.as_str(),
        session.results_count
    );
    Ok(())
}

/// Shortest period the sweeper runs at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically drop terminal sessions older than `ttl`.
pub fn spawn_session_sweeper(
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ttl = match chrono::Duration::from_std(ttl) {
            Ok(ttl) => ttl,
            Err(e) => {
                tracing::warn!("Session TTL {:?} out of range, sweeper disabled: {}", ttl, e);
                return;
            }
        };
        if every < MIN_SWEEP_INTERVAL {
            tracing::warn!("Sweep interval {:?} too short, using {:?}", every, MIN_SWEEP_INTERVAL);
        }
        let mut ticker = tokio::time::interval(every.max(MIN_SWEEP_INTERVAL));
        loop {
            ticker.tick().await;
            match store.purge_expired(Utc::now() - ttl).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!("Purged {} expired sessions", purged),
                Err(e) => tracing::warn!("Session sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rb_core::{PaperSource, SearchStatus, SessionFilter};
    use rb_storage::InMemoryStorage;

    #[tokio::test]
    async fn test_sweeper_purges_terminal_sessions() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemoryStorage::new());
        let request = SearchRequest::new("graph networks", vec![PaperSource::Arxiv], 5);

        let mut done = SearchSession::new("u1", &request);
        done.start().unwrap();
        done.complete(vec![]).unwrap();
        store.create_session(&done).await.unwrap();
        let pending = SearchSession::new("u1", &request);
        store.create_session(&pending).await.unwrap();

        let handle = spawn_session_sweeper(store.clone(), Duration::ZERO, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        let left = store.list_sessions("u1", SessionFilter::default()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].status, SearchStatus::Pending);
    }

    #[tokio::test]
    async fn test_sweeper_survives_zero_interval() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemoryStorage::new());
        let request = SearchRequest::new("graph networks", vec![PaperSource::Arxiv], 5);
        let mut done = SearchSession::new("u1", &request);
        done.start().unwrap();
        done.complete(vec![]).unwrap();
        store.create_session(&done).await.unwrap();

        let handle = spawn_session_sweeper(store.clone(), Duration::ZERO, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());
        handle.abort();

        let left = store.list_sessions("u1", SessionFilter::default()).await.unwrap();
        assert!(left.is_empty());
    }
}
