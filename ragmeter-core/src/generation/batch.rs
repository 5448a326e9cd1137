use crate::dataset::EvalSample;
use crate::error::{EvalError, EvalResult};
use crate::generation::{AnswerClient, GeneratedOutput};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Duration;
use tracing::debug;

/// Runs generation for every sample with at most `max_concurrency`
/// requests in flight, preserving input order in the output.
///
/// The first failed sample aborts the batch and is returned as the
/// error. Each request is bounded by `timeout`.
#[tracing::instrument(skip(client, samples), fields(num_samples = samples.len()))]
pub async fn run_batch(
    client: &dyn AnswerClient,
    samples: &[EvalSample],
    max_concurrency: usize,
    timeout: Duration,
) -> EvalResult<Vec<GeneratedOutput>> {
    let concurrency = max_concurrency.max(1);
    debug!(concurrency, "starting generation batch");

    stream::iter(samples.iter().map(|sample| async move {
        match tokio::time::timeout(timeout, client.generate(sample)).await {
            Ok(result) => result,
            Err(_) => Err(EvalError::Generation {
                sample_id: sample.sample_id.clone(),
                message: format!("generation timed out after {timeout:?}"),
            }),
        }
    }))
    .buffered(concurrency)
    .try_collect()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn make_samples(n: usize) -> Vec<EvalSample> {
        (0..n)
            .map(|i| EvalSample {
                sample_id: format!("s{i}"),
                input: format!("question {i}"),
                human_reference_answer: format!("answer {i}"),
                human_reference_citation: None,
                source: None,
                metadata: Default::default(),
            })
            .collect()
    }

    /// Answers after a per-sample delay, tracking the peak number of
    /// requests in flight.
    struct DelayedClient {
        delays_ms: Vec<u64>,
        in_flight: AtomicUsize,
        peak: Arc<AtomicUsize>,
    }

    impl DelayedClient {
        fn new(delays_ms: Vec<u64>) -> Self {
            Self {
                delays_ms,
                in_flight: AtomicUsize::new(0),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl AnswerClient for DelayedClient {
        async fn generate(&self, sample: &EvalSample) -> EvalResult<GeneratedOutput> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);

            let index: usize = sample.sample_id[1..].parse().unwrap();
            tokio::time::sleep(Duration::from_millis(self.delays_ms[index])).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(GeneratedOutput {
                answer: format!("generated {}", sample.sample_id),
                contexts: vec![],
                raw: serde_json::Value::Null,
            })
        }
    }

    struct FailingClient {
        fail_at: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnswerClient for FailingClient {
        async fn generate(&self, sample: &EvalSample) -> EvalResult<GeneratedOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let index: usize = sample.sample_id[1..].parse().unwrap();
            if index == self.fail_at {
                return Err(EvalError::Generation {
                    sample_id: sample.sample_id.clone(),
                    message: "backend unavailable".to_string(),
                });
            }
            Ok(GeneratedOutput {
                answer: "ok".to_string(),
                contexts: vec![],
                raw: serde_json::Value::Null,
            })
        }
    }

    #[tokio::test]
    async fn outputs_preserve_input_order_despite_varied_latency() {
        let samples = make_samples(6);
        // Early samples are the slowest, so completion order inverts.
        let client = DelayedClient::new(vec![60, 50, 40, 30, 20, 10]);

        let outputs = run_batch(&client, &samples, 6, Duration::from_secs(5))
            .await
            .unwrap();

        let answers: Vec<_> = outputs.iter().map(|o| o.answer.as_str()).collect();
        assert_eq!(
            answers,
            vec![
                "generated s0",
                "generated s1",
                "generated s2",
                "generated s3",
                "generated s4",
                "generated s5"
            ]
        );
    }

    #[tokio::test]
    async fn in_flight_requests_never_exceed_cap() {
        let samples = make_samples(10);
        let client = DelayedClient::new(vec![20; 10]);
        let peak = client.peak.clone();

        run_batch(&client, &samples, 3, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn zero_concurrency_is_treated_as_one() {
        let samples = make_samples(2);
        let client = DelayedClient::new(vec![5, 5]);
        let peak = client.peak.clone();

        run_batch(&client, &samples, 0, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_failure_aborts_the_batch() {
        let samples = make_samples(5);
        let client = FailingClient {
            fail_at: 1,
            calls: AtomicUsize::new(0),
        };

        let err = run_batch(&client, &samples, 1, Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            EvalError::Generation { sample_id, .. } => assert_eq!(sample_id, "s1"),
            other => panic!("unexpected error: {other}"),
        }
        // Sequential concurrency stops right after the failing sample.
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_request_times_out() {
        let samples = make_samples(1);
        let client = DelayedClient::new(vec![200]);

        let err = run_batch(&client, &samples, 1, Duration::from_millis(20))
            .await
            .unwrap_err();

        match err {
            EvalError::Generation { sample_id, message } => {
                assert_eq!(sample_id, "s0");
                assert!(message.contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn order_is_preserved_for_any_delays(
            delays in proptest::collection::vec(0u64..20, 1..8),
            cap in 1usize..8,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            runtime.block_on(async {
                let samples = make_samples(delays.len());
                let client = DelayedClient::new(delays);
                let outputs = run_batch(&client, &samples, cap, Duration::from_secs(5))
                    .await
                    .unwrap();
                for (i, output) in outputs.iter().enumerate() {
                    let expected = format!("generated s{i}");
                    prop_assert_eq!(output.answer.as_str(), expected.as_str());
                }
                Ok(())
            })?;
        }
    }
}
