use anyhow::{Context, Result};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::bot::dispatcher::Dispatcher;
use crate::bot::facts::FactBroadcaster;
use crate::platforms::PlatformConnection;

pub mod credit_commands;
pub mod credits;
pub mod dispatcher;
pub mod emotes;
pub mod facts;
pub mod slots;

/// Core bot engine: owns the platform connection and wires incoming
/// messages into the dispatcher and outgoing replies back out.
pub struct ChatBot {
    connection: Arc<RwLock<Box<dyn PlatformConnection>>>,
    dispatcher: Arc<Dispatcher>,
    facts: Arc<FactBroadcaster>,
}

impl ChatBot {
    pub fn new(
        connection: Box<dyn PlatformConnection>,
        dispatcher: Arc<Dispatcher>,
        facts: Arc<FactBroadcaster>,
    ) -> Self {
        Self {
            connection: Arc::new(RwLock::new(connection)),
            dispatcher,
            facts,
        }
    }

    /// Connect and start the message pump, the dispatcher loop and the
    /// fact timer. Returns immediately; the tasks run until shutdown.
    pub async fn start(&self) -> Result<()> {
        info!("Starting chat bot...");

        let receiver = {
            let mut connection = self.connection.write().await;
            connection.connect().await?;
            connection
                .get_message_receiver()
                .context("Connection produced no message receiver")?
        };

        let (response_tx, response_rx) = mpsc::channel::<(String, String)>(100);

        self.start_response_pump(response_rx);
        self.start_message_processor(receiver, response_tx.clone());
        Arc::clone(&self.facts).spawn_timer(response_tx);

        info!("Chat bot started successfully");
        Ok(())
    }

    /// Drain the response channel back into the platform connection.
    fn start_response_pump(&self, mut response_rx: mpsc::Receiver<(String, String)>) {
        let connection = Arc::clone(&self.connection);
        tokio::spawn(async move {
            while let Some((channel, text)) = response_rx.recv().await {
                let connection = connection.read().await;
                if let Err(e) = connection.send_message(&channel, &text).await {
                    error!("Failed to send response to #{}: {}", channel, e);
                } else {
                    info!("Sent response to #{}: {}", channel, text);
                }
            }
        });
    }

    /// Feed every incoming message through the dispatcher, one at a time.
    fn start_message_processor(
        &self,
        mut receiver: broadcast::Receiver<crate::types::ChatMessage>,
        response_tx: mpsc::Sender<(String, String)>,
    ) {
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        if let Err(e) = dispatcher.handle(&message, &response_tx).await {
                            error!("Failed to handle message from {}: {}", message.username, e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Message receiver lagged by {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Message receiver closed");
                        break;
                    }
                }
            }
        });
    }

    /// Disconnect from the platform. In-flight external calls are not
    /// awaited; credit writes are already on disk by this point.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down chat bot...");
        self.connection.write().await.disconnect().await?;
        info!("Chat bot shutdown complete");
        Ok(())
    }
}
