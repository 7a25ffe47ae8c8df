/// === BROADCAST ENGINE ===
///
/// Fans one inbound chat message out to every live connection, translating
/// independently into each receiver's preferred language and measuring the
/// translation latency per delivery. One broken receiver never blocks the
/// others.
use std::sync::Arc;

use tokio::time::Instant;

use crate::logger::Logger;
use crate::server::protocol::{DeliveryRecord, OutboundFrame, epoch_seconds, round2};
use crate::server::registry::{ConnectionRegistry, ReceiverEntry};
use crate::translate::Translator;

#[derive(Clone)]
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    translator: Arc<dyn Translator>,
    logger: Logger,
}

impl BroadcastEngine {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        translator: Arc<dyn Translator>,
        logger: Logger,
    ) -> Self {
        Self {
            registry,
            translator,
            logger,
        }
    }

    /// Deliver `text` from `sender` to every live connection, the sender's
    /// own included. Receivers are handled by independent tasks; the call
    /// returns once every delivery has been enqueued (or given up on), which
    /// is what keeps successive messages from one sender in order.
    pub async fn broadcast(&self, sender: &str, text: &str, translate_flag: bool) {
        // Copy the receiver list first; the slow translation calls below must
        // not run under the registry lock.
        let receivers = self.registry.snapshot_receivers().await;
        self.logger.debug(&format!(
            "📤 Broadcasting from '{}' to {} receiver(s)",
            sender,
            receivers.len()
        ));

        let mut deliveries = Vec::with_capacity(receivers.len());
        for entry in receivers {
            let translator = Arc::clone(&self.translator);
            let logger = self.logger.clone();
            let sender = sender.to_string();
            let original = text.to_string();
            deliveries.push(tokio::spawn(async move {
                deliver_one(entry, translator, logger, sender, original, translate_flag).await;
            }));
        }

        for handle in deliveries {
            let _ = handle.await;
        }
    }
}

/// Produce and enqueue one Delivery Record for a single receiver.
async fn deliver_one(
    entry: ReceiverEntry,
    translator: Arc<dyn Translator>,
    logger: Logger,
    sender: String,
    original: String,
    translate_flag: bool,
) {
    let ReceiverEntry {
        conn,
        username: receiver,
        lang,
    } = entry;

    // Start latency timer
    let start = Instant::now();

    let translated = if translate_flag {
        let text = original.clone();
        let target = lang.clone();
        // The provider is synchronous and may block for a long time; keep it
        // off the async worker threads.
        match tokio::task::spawn_blocking(move || translator.translate(&text, &target)).await {
            Ok(Ok(translated)) => translated,
            Ok(Err(e)) => {
                logger.warn(&format!(
                    "⚠️ Translation to '{}' for '{}' failed: {} — sending original text",
                    lang, receiver, e
                ));
                original.clone()
            }
            Err(e) => {
                logger.warn(&format!(
                    "⚠️ Translation task for '{}' did not complete: {} — sending original text",
                    receiver, e
                ));
                original.clone()
            }
        }
    } else {
        original.clone()
    };

    let latency = round2(start.elapsed().as_secs_f64() * 1000.0);

    let record = DeliveryRecord {
        sender,
        original,
        translated,
        target_lang: lang,
        latency,
        timestamp: epoch_seconds(),
    };

    if conn.outbound.send(OutboundFrame::Delivery(record)).is_err() {
        logger.warn(&format!(
            "❌ Failed to deliver to '{}': connection already closed",
            receiver
        ));
    }
}
