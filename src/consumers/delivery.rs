//! The per-delivery pipeline: decode the payload, run the handler, settle the
//! delivery with the broker.
//!
//! Each delivery moves through `Delivered -> Processing -> settled`, where
//! settled is one of acknowledged, rejected-and-requeued or discarded. There is
//! no intermediate "deferred" state: a delivery is settled exactly once, right
//! after its handler invocation completes.
use crate::consumers::{error::HandlerError, handler::Handler, incoming_message::Incoming};
use futures_util::FutureExt;
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

/// The broker action chosen for a single delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Positive acknowledgement - the message is permanently removed from the
    /// queue.
    Ack,
    /// Negative acknowledgement with requeue - the message goes back on the
    /// queue and becomes immediately available for redelivery.
    Requeue,
    /// Rejection without requeue - the message is dropped, or routed to the
    /// dead letter exchange if the queue is configured with one.
    Discard,
}

/// Map a handler outcome to the broker action.
///
/// This is deliberately a pure function: the ack/reject decision depends on
/// nothing but the result value returned by the handler.
pub(crate) fn verdict(outcome: &Result<(), HandlerError>) -> Verdict {
    match outcome {
        Ok(()) => Verdict::Ack,
        Err(_) => Verdict::Requeue,
    }
}

/// The settlement operations a delivery supports.
///
/// A thin seam over `lapin`'s [`Acker`] so the exactly-one-settlement
/// properties of the pipeline can be exercised without a broker.
#[async_trait::async_trait]
pub(crate) trait Settlement: Send + Sync {
    async fn ack(&self, options: BasicAckOptions) -> Result<(), lapin::Error>;
    async fn nack(&self, options: BasicNackOptions) -> Result<(), lapin::Error>;
    async fn reject(&self, options: BasicRejectOptions) -> Result<(), lapin::Error>;
}

#[async_trait::async_trait]
impl Settlement for Acker {
    async fn ack(&self, options: BasicAckOptions) -> Result<(), lapin::Error> {
        Acker::ack(self, options).await
    }

    async fn nack(&self, options: BasicNackOptions) -> Result<(), lapin::Error> {
        Acker::nack(self, options).await
    }

    async fn reject(&self, options: BasicRejectOptions) -> Result<(), lapin::Error> {
        Acker::reject(self, options).await
    }
}

/// Tell the broker the fate of a single delivery.
///
/// Always single-message semantics: `multiple` is never set, a settlement
/// instruction refers to exactly one delivery tag.
async fn settle<S: Settlement + ?Sized>(acker: &S, verdict: Verdict) -> Result<(), lapin::Error> {
    match verdict {
        Verdict::Ack => acker.ack(BasicAckOptions { multiple: false }).await,
        Verdict::Requeue => {
            acker
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue: true,
                })
                .await
        }
        Verdict::Discard => acker.reject(BasicRejectOptions { requeue: false }).await,
    }
}

/// Process one delivery end to end: decode, handle, settle.
///
/// Failures are contained here - a failing (or panicking) handler results in a
/// requeue of this one delivery and never escapes to the subscription loop. A
/// payload that is not valid UTF-8 never reaches the handler: redelivering it
/// could not possibly succeed, so it is discarded instead of requeued.
pub(crate) async fn process<C, S>(
    context: Arc<C>,
    handler: &dyn Handler<C>,
    queue_name: &str,
    delivery_tag: u64,
    payload: Vec<u8>,
    acker: &S,
) where
    C: Send + Sync + 'static,
    S: Settlement + ?Sized,
{
    let verdict = match String::from_utf8(payload) {
        Err(decode_error) => {
            error!(
                delivery_tag,
                queue_name, "discarding delivery: payload is not valid UTF-8: {}", decode_error
            );
            Verdict::Discard
        }
        Ok(text) => {
            let incoming = Incoming {
                context,
                payload: &text,
                queue_name,
                delivery_tag,
            };
            // The single panic boundary of the pipeline: a panicking handler is
            // a failed handler, not the end of the subscription.
            let outcome = match AssertUnwindSafe(handler.handle(incoming)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_panic) => Err(HandlerError::msg("the message handler panicked")),
            };
            if let Err(failure) = &outcome {
                error!(
                    delivery_tag,
                    queue_name, "failed to process message: {}", failure
                );
            }
            verdict(&outcome)
        }
    };

    if let Err(settle_error) = settle(acker, verdict).await {
        error!(
            delivery_tag,
            queue_name, "failed to settle delivery with the broker: {}", settle_error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::handler::ClosureHandler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Settled {
        Ack { multiple: bool },
        Nack { multiple: bool, requeue: bool },
        Reject { requeue: bool },
    }

    #[derive(Default)]
    struct RecordingAcker {
        settlements: Mutex<Vec<Settled>>,
    }

    impl RecordingAcker {
        fn settlements(&self) -> Vec<Settled> {
            self.settlements.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Settlement for RecordingAcker {
        async fn ack(&self, options: BasicAckOptions) -> Result<(), lapin::Error> {
            self.settlements.lock().unwrap().push(Settled::Ack {
                multiple: options.multiple,
            });
            Ok(())
        }

        async fn nack(&self, options: BasicNackOptions) -> Result<(), lapin::Error> {
            self.settlements.lock().unwrap().push(Settled::Nack {
                multiple: options.multiple,
                requeue: options.requeue,
            });
            Ok(())
        }

        async fn reject(&self, options: BasicRejectOptions) -> Result<(), lapin::Error> {
            self.settlements.lock().unwrap().push(Settled::Reject {
                requeue: options.requeue,
            });
            Ok(())
        }
    }

    async fn succeeding_handler(_incoming: Incoming<'_, ()>) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn failing_handler(_incoming: Incoming<'_, ()>) -> Result<(), HandlerError> {
        Err(HandlerError::msg("processing went sideways"))
    }

    #[test]
    fn the_verdict_is_a_pure_function_of_the_handler_outcome() {
        assert_eq!(verdict(&Ok(())), Verdict::Ack);
        assert_eq!(
            verdict(&Err(HandlerError::msg("anything at all"))),
            Verdict::Requeue
        );
    }

    #[tokio::test]
    async fn a_successful_handler_acks_exactly_once_with_single_message_semantics() {
        let acker = RecordingAcker::default();
        let handler = ClosureHandler(succeeding_handler);

        process(
            Arc::new(()),
            &handler,
            "orders",
            1,
            b"hello".to_vec(),
            &acker,
        )
        .await;

        assert_eq!(acker.settlements(), vec![Settled::Ack { multiple: false }]);
    }

    #[tokio::test]
    async fn a_failing_handler_requeues_exactly_once_with_single_message_semantics() {
        let acker = RecordingAcker::default();
        let handler = ClosureHandler(failing_handler);

        process(Arc::new(()), &handler, "orders", 7, b"bad".to_vec(), &acker).await;

        assert_eq!(
            acker.settlements(),
            vec![Settled::Nack {
                multiple: false,
                requeue: true
            }]
        );
    }

    #[tokio::test]
    async fn a_panicking_handler_is_treated_as_a_failure_and_requeued() {
        async fn panicking_handler(_incoming: Incoming<'_, ()>) -> Result<(), HandlerError> {
            panic!("woops");
        }

        let acker = RecordingAcker::default();
        let handler = ClosureHandler(panicking_handler);

        process(Arc::new(()), &handler, "orders", 3, b"boom".to_vec(), &acker).await;

        assert_eq!(
            acker.settlements(),
            vec![Settled::Nack {
                multiple: false,
                requeue: true
            }]
        );
    }

    #[tokio::test]
    async fn a_non_utf8_payload_is_discarded_without_invoking_the_handler() {
        async fn counting_handler(
            incoming: Incoming<'_, AtomicUsize>,
        ) -> Result<(), HandlerError> {
            incoming.context.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        let acker = RecordingAcker::default();
        let handler = ClosureHandler(counting_handler);
        let invocations = Arc::new(AtomicUsize::new(0));

        process(
            invocations.clone(),
            &handler,
            "orders",
            4,
            vec![0xff, 0xfe, 0xfd],
            &acker,
        )
        .await;

        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(
            acker.settlements(),
            vec![Settled::Reject { requeue: false }]
        );
    }

    #[tokio::test]
    async fn every_delivery_is_settled_against_its_own_tag() {
        // Ten consecutive deliveries where every third handler invocation fails:
        // expect 3 requeues and 7 acks, each matched to its own delivery tag.
        async fn every_third_fails(incoming: Incoming<'_, ()>) -> Result<(), HandlerError> {
            if incoming.delivery_tag % 3 == 0 {
                Err(HandlerError::msg("transient downstream failure"))
            } else {
                Ok(())
            }
        }

        let handler = ClosureHandler(every_third_fails);
        let mut settlements = Vec::new();

        for delivery_tag in 1..=10 {
            let acker = RecordingAcker::default();
            process(
                Arc::new(()),
                &handler,
                "orders",
                delivery_tag,
                b"payload".to_vec(),
                &acker,
            )
            .await;
            let mut settled = acker.settlements();
            assert_eq!(settled.len(), 1, "delivery {delivery_tag} settled more than once");
            settlements.push((delivery_tag, settled.remove(0)));
        }

        let requeued: Vec<u64> = settlements
            .iter()
            .filter(|(_, s)| matches!(s, Settled::Nack { requeue: true, .. }))
            .map(|(tag, _)| *tag)
            .collect();
        let acked: Vec<u64> = settlements
            .iter()
            .filter(|(_, s)| matches!(s, Settled::Ack { .. }))
            .map(|(tag, _)| *tag)
            .collect();

        assert_eq!(requeued, vec![3, 6, 9]);
        assert_eq!(acked, vec![1, 2, 4, 5, 7, 8, 10]);
    }
}
