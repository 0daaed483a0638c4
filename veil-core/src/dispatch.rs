use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use veil_common::{EngineId, RawEngineResponse};
use veil_engines::{Engine, EngineRequest};

/// One engine call to perform. Responses are keyed by `id`, the registry
/// id, whatever the adapter calls itself.
pub struct DispatchTarget {
    pub id: EngineId,
    pub engine: Arc<dyn Engine>,
    pub request: EngineRequest,
}

/// Fans a request out to many engines, each under its own timeout, all
/// sharing one global concurrency ceiling.
#[derive(Clone)]
pub struct Dispatcher {
    slots: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(global_concurrency: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(global_concurrency.max(1))),
        }
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run every target concurrently and collect one response per engine.
    ///
    /// A target's timeout covers both the wait for a global slot and the
    /// adapter call. Whatever is still running at `deadline` is aborted and
    /// reported as a timeout.
    pub async fn dispatch(
        &self,
        targets: Vec<DispatchTarget>,
        deadline: Instant,
    ) -> BTreeMap<EngineId, RawEngineResponse> {
        let expected: Vec<EngineId> = targets.iter().map(|t| t.id.clone()).collect();
        let mut set = JoinSet::new();

        for DispatchTarget {
            id,
            engine,
            request,
        } in targets
        {
            let slots = self.slots.clone();
            set.spawn(async move {
                let budget = request.timeout;
                let call = async {
                    let Ok(_slot) = slots.acquire_owned().await else {
                        return Err(RawEngineResponse::Error("dispatcher closed".into()));
                    };
                    match engine.issue(&request).await {
                        Ok(payload) => Ok(payload),
                        Err(err) if err.is_timeout() => Err(RawEngineResponse::Timeout),
                        Err(err) => Err(RawEngineResponse::Error(err.to_string())),
                    }
                };
                let response = match timeout(budget, call).await {
                    Ok(Ok(payload)) => RawEngineResponse::Ok(payload),
                    Ok(Err(failed)) => failed,
                    Err(_) => RawEngineResponse::Timeout,
                };
                (id, response)
            });
        }

        let mut responses = BTreeMap::new();
        let mut deadline_hit = false;
        loop {
            match timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((id, response)))) => {
                    log_response(&id, &response);
                    responses.insert(id, response);
                }
                Ok(Some(Err(join_err))) => {
                    tracing::error!(error = %join_err, "dispatch.task.failed");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    set.abort_all();
                    break;
                }
            }
        }

        for id in expected {
            responses.entry(id.clone()).or_insert_with(|| {
                if deadline_hit {
                    tracing::warn!(engine = %id, "dispatch.engine.deadline");
                    RawEngineResponse::Timeout
                } else {
                    RawEngineResponse::Error("engine task failed".into())
                }
            });
        }
        responses
    }
}

fn log_response(id: &EngineId, response: &RawEngineResponse) {
    match response {
        RawEngineResponse::Ok(payload) => {
            tracing::debug!(engine = %id, hits = payload.hits.len(), "dispatch.engine.ok")
        }
        RawEngineResponse::Timeout => tracing::warn!(engine = %id, "dispatch.engine.timeout"),
        RawEngineResponse::Error(cause) => {
            tracing::warn!(engine = %id, cause = %cause, "dispatch.engine.error")
        }
        RawEngineResponse::Skipped(reason) => {
            tracing::debug!(engine = %id, reason = %reason, "dispatch.engine.skipped")
        }
    }
}
