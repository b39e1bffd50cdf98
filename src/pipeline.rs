use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::chunk::{chunk, DEFAULT_CHUNK_SIZE};
use crate::error::{ChunkFailure, PipelineError, Stage};
use crate::gateway::{FuriganaAnnotation, Gateway, TranslationPair};
use crate::kana::transliterate;
use crate::tokenize::tokenize;

/// One flip-card: the Japanese side shows `furigana`, the back shows `english` and `romaji`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRecord {
    pub english: String,
    pub japanese: String,
    pub furigana: String,
    pub romaji: String,
}

impl WordRecord {
    fn merge(pair: TranslationPair, annotation: Option<FuriganaAnnotation>) -> Self {
        let furigana = match annotation {
            Some(annotation) => annotation.furigana,
            None => {
                debug!("no reading for '{}'; reusing the Japanese text", pair.japanese);
                pair.japanese.clone()
            }
        };
        let romaji = transliterate(&furigana);
        Self {
            english: pair.english,
            japanese: pair.japanese,
            furigana,
            romaji,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Tokenized,
    ChunkInFlight,
    ChunkComplete,
    ChunkFailed,
    AllComplete,
}

/// What the caller needs to report about the last failed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub chunk_index: usize,
    pub stage: Option<Stage>,
    pub kind: String,
    pub message: String,
}

impl From<&ChunkFailure> for FailureSummary {
    fn from(failure: &ChunkFailure) -> Self {
        Self {
            chunk_index: failure.chunk_index,
            stage: failure.error.stage(),
            kind: failure.error.kind().to_string(),
            message: failure.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ChunkOutcome {
    Completed { chunk_index: usize, added: usize },
    Failed(ChunkFailure),
    AllComplete,
}

/// Session state for one input text. Records only ever grow.
#[derive(Clone)]
pub struct PipelineState {
    credential: String,
    tokens: Vec<String>,
    chunks: Vec<Vec<String>>,
    current_chunk: usize,
    records: Vec<WordRecord>,
    progress_percent: f64,
    phase: Phase,
    last_failure: Option<FailureSummary>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            credential: String::new(),
            tokens: Vec::new(),
            chunks: Vec::new(),
            current_chunk: 0,
            records: Vec::new(),
            progress_percent: 0.0,
            phase: Phase::Idle,
            last_failure: None,
        }
    }
}

impl fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineState")
            .field("credential", &"<redacted>")
            .field("tokens", &self.tokens.len())
            .field("chunks", &self.chunks.len())
            .field("current_chunk", &self.current_chunk)
            .field("records", &self.records.len())
            .field("progress_percent", &self.progress_percent)
            .field("phase", &self.phase)
            .field("last_failure", &self.last_failure)
            .finish()
    }
}

impl PipelineState {
    #[cfg(test)]
    pub(crate) fn with_records(
        chunks: Vec<Vec<String>>,
        current_chunk: usize,
        records: Vec<WordRecord>,
    ) -> Self {
        let mut state = Self {
            tokens: chunks.concat(),
            chunks,
            current_chunk,
            records,
            phase: Phase::ChunkComplete,
            ..Self::default()
        };
        state.recompute_progress();
        state
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn chunks(&self) -> &[Vec<String>] {
        &self.chunks
    }

    pub fn records(&self) -> &[WordRecord] {
        &self.records
    }

    pub fn current_chunk(&self) -> usize {
        self.current_chunk
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn progress_percent(&self) -> f64 {
        self.progress_percent
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_failure(&self) -> Option<&FailureSummary> {
        self.last_failure.as_ref()
    }

    pub fn has_pending_chunks(&self) -> bool {
        self.current_chunk < self.chunks.len()
    }

    fn recompute_progress(&mut self) {
        self.progress_percent = if self.chunks.is_empty() {
            100.0
        } else {
            100.0 * self.current_chunk as f64 / self.chunks.len() as f64
        };
    }
}

/// Drives chunks through a [`Gateway`] strictly one at a time.
#[derive(Debug, Clone)]
pub struct Pipeline<G: Gateway> {
    gateway: G,
    chunk_size: usize,
}

impl<G: Gateway> Pipeline<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Tokenizes and chunks `text`. Nothing is sent to the gateway yet.
    pub fn start(&self, text: &str, credential: &str) -> Result<PipelineState, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::InvalidInput("text is empty".to_string()));
        }
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(PipelineError::InvalidInput("API key is empty".to_string()));
        }
        let tokens = tokenize(text);
        let chunks = chunk(&tokens, self.chunk_size)?;
        info!(
            "tokenized {} words into {} chunks of up to {}",
            tokens.len(),
            chunks.len(),
            self.chunk_size
        );
        Ok(PipelineState {
            credential: credential.to_string(),
            tokens,
            chunks,
            phase: Phase::Tokenized,
            ..PipelineState::default()
        })
    }

    /// Processes the chunk at `current_chunk` and moves the index past it,
    /// whether or not the chunk succeeded.
    pub async fn advance_chunk(&self, state: &mut PipelineState) -> ChunkOutcome {
        if !state.has_pending_chunks() {
            state.progress_percent = 100.0;
            state.phase = Phase::AllComplete;
            return ChunkOutcome::AllComplete;
        }

        let index = state.current_chunk;
        state.phase = Phase::ChunkInFlight;
        debug!(
            "processing chunk {}/{} ({} words)",
            index + 1,
            state.chunks.len(),
            state.chunks[index].len()
        );
        let result = self
            .process_chunk(&state.chunks[index], &state.credential)
            .await;
        state.current_chunk += 1;
        state.recompute_progress();

        match result {
            Ok(records) => {
                let added = records.len();
                state.records.extend(records);
                state.last_failure = None;
                state.phase = if state.has_pending_chunks() {
                    Phase::ChunkComplete
                } else {
                    Phase::AllComplete
                };
                info!(
                    "chunk {}/{} complete: {} words ({:.0}%)",
                    index + 1,
                    state.chunks.len(),
                    added,
                    state.progress_percent
                );
                ChunkOutcome::Completed {
                    chunk_index: index,
                    added,
                }
            }
            Err(error) => {
                let failure = ChunkFailure {
                    chunk_index: index,
                    error,
                };
                warn!("{}", failure);
                state.last_failure = Some(FailureSummary::from(&failure));
                state.phase = Phase::ChunkFailed;
                ChunkOutcome::Failed(failure)
            }
        }
    }

    /// Advances until every chunk has been attempted. Failed chunks are
    /// returned and skipped; they never stop the loop.
    pub async fn run_all(&self, state: &mut PipelineState) -> Vec<ChunkOutcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.advance_chunk(state).await {
                ChunkOutcome::AllComplete => break,
                outcome => outcomes.push(outcome),
            }
        }
        outcomes
    }

    async fn process_chunk(
        &self,
        words: &[String],
        credential: &str,
    ) -> Result<Vec<WordRecord>, PipelineError> {
        let pairs = self.gateway.translate(words, credential).await?;
        let japanese = pairs
            .iter()
            .map(|pair| pair.japanese.clone())
            .collect::<Vec<_>>();
        let annotations = self.gateway.annotate_furigana(&japanese, credential).await?;
        let mut annotations = annotations.into_iter();
        Ok(pairs
            .into_iter()
            .map(|pair| WordRecord::merge(pair, annotations.next().flatten()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayFuture;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Translates `w` to `J(w)` and reads every Japanese word as `ねこ`.
    #[derive(Clone, Default)]
    struct FakeGateway {
        fail_translate_on_call: HashSet<usize>,
        fail_annotate_on_call: HashSet<usize>,
        drop_last_annotation: bool,
        translate_calls: Arc<Mutex<usize>>,
        annotate_calls: Arc<Mutex<usize>>,
    }

    impl FakeGateway {
        fn translate_count(&self) -> usize {
            *self.translate_calls.lock().unwrap()
        }

        fn annotate_count(&self) -> usize {
            *self.annotate_calls.lock().unwrap()
        }
    }

    impl Gateway for FakeGateway {
        fn translate<'a>(
            &'a self,
            words: &'a [String],
            _credential: &'a str,
        ) -> GatewayFuture<'a, Vec<TranslationPair>> {
            let call = {
                let mut calls = self.translate_calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            let fail = self.fail_translate_on_call.contains(&call);
            Box::pin(async move {
                if fail {
                    return Err(PipelineError::Gateway {
                        stage: Stage::Translate,
                        status: 502,
                        message: "Bad Gateway".to_string(),
                    });
                }
                Ok(words
                    .iter()
                    .map(|word| TranslationPair {
                        english: word.clone(),
                        japanese: format!("J({})", word),
                    })
                    .collect())
            })
        }

        fn annotate_furigana<'a>(
            &'a self,
            japanese_words: &'a [String],
            _credential: &'a str,
        ) -> GatewayFuture<'a, Vec<Option<FuriganaAnnotation>>> {
            let call = {
                let mut calls = self.annotate_calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            let fail = self.fail_annotate_on_call.contains(&call);
            let drop_last = self.drop_last_annotation;
            Box::pin(async move {
                if fail {
                    return Err(PipelineError::Extraction {
                        stage: Stage::Annotate,
                    });
                }
                let mut annotations = japanese_words
                    .iter()
                    .map(|_| {
                        Some(FuriganaAnnotation {
                            furigana: "ねこ".to_string(),
                        })
                    })
                    .collect::<Vec<_>>();
                if drop_last {
                    annotations.pop();
                }
                Ok(annotations)
            })
        }
    }

    fn text_with_words(count: usize) -> String {
        (0..count)
            .map(|n| format!("w{}", n))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn start_rejects_empty_text_and_credential() {
        let pipeline = Pipeline::new(FakeGateway::default());
        assert!(matches!(
            pipeline.start("", "sk-test"),
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(matches!(
            pipeline.start("hello", "  "),
            Err(PipelineError::InvalidInput(_))
        ));
        assert_eq!(pipeline.gateway().translate_count(), 0);
    }

    #[test]
    fn start_rejects_zero_chunk_size() {
        let pipeline = Pipeline::new(FakeGateway::default()).with_chunk_size(0);
        assert!(matches!(
            pipeline.start("hello", "sk-test"),
            Err(PipelineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn start_tokenizes_and_chunks() {
        let pipeline = Pipeline::new(FakeGateway::default());
        let state = pipeline.start(&text_with_words(250), "sk-test").unwrap();
        assert_eq!(state.tokens().len(), 250);
        assert_eq!(state.total_chunks(), 2);
        assert_eq!(state.chunks()[0].len(), 200);
        assert_eq!(state.chunks()[1].len(), 50);
        assert_eq!(state.current_chunk(), 0);
        assert!(state.records().is_empty());
        assert_eq!(state.progress_percent(), 0.0);
        assert_eq!(state.phase(), Phase::Tokenized);
    }

    #[tokio::test]
    async fn advances_two_chunks_then_stops() {
        let pipeline = Pipeline::new(FakeGateway::default());
        let mut state = pipeline.start(&text_with_words(250), "sk-test").unwrap();

        let outcome = pipeline.advance_chunk(&mut state).await;
        assert!(matches!(
            outcome,
            ChunkOutcome::Completed {
                chunk_index: 0,
                added: 200
            }
        ));
        assert_eq!(state.records().len(), 200);
        assert_eq!(state.progress_percent(), 50.0);
        assert_eq!(state.phase(), Phase::ChunkComplete);

        pipeline.advance_chunk(&mut state).await;
        assert_eq!(state.records().len(), 250);
        assert_eq!(state.progress_percent(), 100.0);
        assert_eq!(state.phase(), Phase::AllComplete);

        let outcome = pipeline.advance_chunk(&mut state).await;
        assert!(matches!(outcome, ChunkOutcome::AllComplete));
        assert_eq!(state.records().len(), 250);
        assert_eq!(state.current_chunk(), 2);
        assert_eq!(pipeline.gateway().translate_count(), 2);
    }

    #[tokio::test]
    async fn records_follow_token_order_with_duplicates() {
        let pipeline = Pipeline::new(FakeGateway::default()).with_chunk_size(2);
        let mut state = pipeline.start("cat, dog. cat!", "sk-test").unwrap();
        let outcomes = pipeline.run_all(&mut state).await;
        assert_eq!(outcomes.len(), 2);
        let english = state
            .records()
            .iter()
            .map(|record| record.english.as_str())
            .collect::<Vec<_>>();
        assert_eq!(english, vec!["cat", "dog", "cat"]);
        assert_eq!(state.records()[0].japanese, "J(cat)");
        assert_eq!(state.records()[0].romaji, "ne-ko");
    }

    #[tokio::test]
    async fn failed_annotation_skips_chunk_but_advances() {
        let gateway = FakeGateway {
            fail_annotate_on_call: HashSet::from([1]),
            ..FakeGateway::default()
        };
        let pipeline = Pipeline::new(gateway);
        let mut state = pipeline.start(&text_with_words(250), "sk-test").unwrap();

        match pipeline.advance_chunk(&mut state).await {
            ChunkOutcome::Failed(failure) => {
                assert_eq!(failure.chunk_index, 0);
                assert_eq!(failure.error.stage(), Some(Stage::Annotate));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(state.records().is_empty());
        assert_eq!(state.current_chunk(), 1);
        assert_eq!(state.progress_percent(), 50.0);
        assert_eq!(state.phase(), Phase::ChunkFailed);
        let summary = state.last_failure().unwrap();
        assert_eq!(summary.chunk_index, 0);
        assert_eq!(summary.kind, "extraction");

        let outcome = pipeline.advance_chunk(&mut state).await;
        assert!(matches!(
            outcome,
            ChunkOutcome::Completed {
                chunk_index: 1,
                added: 50
            }
        ));
        assert_eq!(state.records().len(), 50);
        assert_eq!(state.records()[0].english, "w200");
        assert!(state.last_failure().is_none());
    }

    #[tokio::test]
    async fn failed_translation_never_requests_furigana() {
        let gateway = FakeGateway {
            fail_translate_on_call: HashSet::from([1]),
            ..FakeGateway::default()
        };
        let pipeline = Pipeline::new(gateway);
        let mut state = pipeline.start("one two", "sk-test").unwrap();
        let outcome = pipeline.advance_chunk(&mut state).await;
        assert!(matches!(outcome, ChunkOutcome::Failed(_)));
        assert_eq!(pipeline.gateway().annotate_count(), 0);
        assert_eq!(state.progress_percent(), 100.0);
    }

    #[tokio::test]
    async fn run_all_continues_past_failures() {
        let gateway = FakeGateway {
            fail_translate_on_call: HashSet::from([2]),
            ..FakeGateway::default()
        };
        let pipeline = Pipeline::new(gateway).with_chunk_size(1);
        let mut state = pipeline.start("a b c", "sk-test").unwrap();
        let outcomes = pipeline.run_all(&mut state).await;
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[1], ChunkOutcome::Failed(_)));
        let english = state
            .records()
            .iter()
            .map(|record| record.english.as_str())
            .collect::<Vec<_>>();
        assert_eq!(english, vec!["a", "c"]);
        assert_eq!(state.progress_percent(), 100.0);
    }

    #[tokio::test]
    async fn missing_annotation_reuses_japanese_text() {
        let gateway = FakeGateway {
            drop_last_annotation: true,
            ..FakeGateway::default()
        };
        let pipeline = Pipeline::new(gateway);
        let mut state = pipeline.start("red green blue", "sk-test").unwrap();
        pipeline.advance_chunk(&mut state).await;
        let records = state.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].furigana, "ねこ");
        assert_eq!(records[2].furigana, records[2].japanese);
        assert_eq!(records[2].romaji, "J-(-b-l-u-e-)");
    }

    #[test]
    fn debug_output_hides_credential() {
        let pipeline = Pipeline::new(FakeGateway::default());
        let state = pipeline.start("cat dog", "sk-secret-123").unwrap();
        let rendered = format!("{:?}", state);
        assert!(!rendered.contains("sk-secret-123"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn text_without_words_completes_immediately() {
        let pipeline = Pipeline::new(FakeGateway::default());
        let mut state = pipeline.start("... !!!", "sk-test").unwrap();
        assert_eq!(state.total_chunks(), 0);
        let outcome = pipeline.advance_chunk(&mut state).await;
        assert!(matches!(outcome, ChunkOutcome::AllComplete));
        assert_eq!(state.progress_percent(), 100.0);
        assert_eq!(pipeline.gateway().translate_count(), 0);
    }
}
