use super::{BrokerClient, Connection, Connector, Credentials, Message, INCOMING_CAPACITY};
use crate::errors::{Error, Result};
use crate::topic::topic_matches;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// In-process broker. Routes publishes to matching subscriptions and keeps a
/// log of every accepted publish. Connects, publishes and stalls can be
/// scripted per username or topic.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    subscriptions: Vec<Subscription>,
    published: Vec<Message>,
    clients: Vec<String>,
    rejected_usernames: HashSet<String>,
    failing_topics: HashMap<String, usize>,
    stalled_topics: HashSet<String>,
}

struct Subscription {
    filter: String,
    tx: mpsc::Sender<Message>,
}

enum Route {
    Stall,
    Fail,
    Deliver(Vec<mpsc::Sender<Message>>),
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuses future connects that authenticate with `username`.
    pub fn reject_username(&self, username: &str) {
        self.lock().rejected_usernames.insert(username.to_string());
    }

    /// Fails the next `count` publishes to `topic`.
    pub fn fail_next_publishes(&self, topic: &str, count: usize) {
        *self.lock().failing_topics.entry(topic.to_string()).or_default() += count;
    }

    /// Publishes to `topic` never complete.
    pub fn stall_publishes(&self, topic: &str) {
        self.lock().stalled_topics.insert(topic.to_string());
    }

    pub fn published(&self) -> Vec<Message> {
        self.lock().published.clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<Message> {
        self.lock()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Client ids of every accepted session, in connect order.
    pub fn clients(&self) -> Vec<String> {
        self.lock().clients.clone()
    }

    fn route(&self, message: &Message) -> Route {
        let mut state = self.lock();

        if state.stalled_topics.contains(&message.topic) {
            return Route::Stall;
        }
        if let Some(remaining) = state.failing_topics.get_mut(&message.topic) {
            if *remaining > 0 {
                *remaining -= 1;
                return Route::Fail;
            }
        }

        state.published.push(message.clone());
        let targets = state
            .subscriptions
            .iter()
            .filter(|s| topic_matches(&s.filter, &message.topic))
            .map(|s| s.tx.clone())
            .collect();
        Route::Deliver(targets)
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, credentials: &Credentials) -> Result<Connection> {
        let mut state = self.lock();
        if state.rejected_usernames.contains(&credentials.username) {
            return Err(Error::Connection {
                client_id: credentials.client_id.clone(),
                reason: "not authorized".to_string(),
            });
        }
        state.clients.push(credentials.client_id.clone());

        let (tx, rx) = mpsc::channel(INCOMING_CAPACITY);
        let client = MemoryClient {
            broker: self.clone(),
            client_id: credentials.client_id.clone(),
            incoming: tx,
        };

        Ok(Connection {
            client: Arc::new(client),
            incoming: rx,
        })
    }
}

struct MemoryClient {
    broker: MemoryBroker,
    client_id: String,
    incoming: mpsc::Sender<Message>,
}

#[async_trait]
impl BrokerClient for MemoryClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let message = Message {
            topic: topic.to_string(),
            payload,
        };

        match self.broker.route(&message) {
            Route::Stall => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Route::Fail => Err(Error::Publish {
                topic: message.topic,
                reason: "injected failure".to_string(),
            }),
            Route::Deliver(targets) => {
                for tx in targets {
                    match tx.try_send(message.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            warn!("Subscriber queue full, dropping message on {}", message.topic)
                        }
                        Err(TrySendError::Closed(_)) => {
                            debug!("Subscriber gone, skipping message on {}", message.topic)
                        }
                    }
                }
                Ok(())
            }
        }
    }

    async fn subscribe(&self, filter: &str) -> Result<()> {
        debug!("{} subscribed to {}", self.client_id, filter);
        self.broker.lock().subscriptions.push(Subscription {
            filter: filter.to_string(),
            tx: self.incoming.clone(),
        });
        Ok(())
    }
}
