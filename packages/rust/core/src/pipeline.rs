//! End-to-end run: conversation → normalize → chunk → (cluster) → sections → article.
//!
//! A run is a lazy stream of [`ProgressEvent`]s. Nothing happens until the
//! stream is polled, and dropping it cancels the run together with any open
//! completion stream.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, info, instrument, warn};

use chatscribe_llm::{Embedder, Generator};
use chatscribe_shared::{
    AppConfig, ChatscribeError, ChunkingConfig, Message, ProgressEvent, RunId,
};
use chatscribe_text::{Chunker, normalize};
use chatscribe_transcript::{PageFetcher, extract_transcript, render_transcript};

use crate::article::Article;
use crate::cluster::{ClusterOptions, cluster_chunks};
use crate::context::ContextManager;
use crate::overlap::trigram_overlap;
use crate::sections::SectionRequest;

/// Tunables for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunking: ChunkingConfig,
    /// Reduce chunks to cluster representatives before writing.
    pub cluster: bool,
    pub clustering: ClusterOptions,
    pub trailing_window_words: usize,
    /// Trigram overlap ratio with the running summary above which a section is flagged.
    pub overlap_warn_ratio: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            chunking: config.chunking.clone(),
            cluster: config.defaults.cluster,
            clustering: ClusterOptions::from(&config.generation),
            trailing_window_words: config.generation.trailing_window_words,
            overlap_warn_ratio: config.generation.overlap_warn_ratio,
        }
    }
}

/// Turns conversations into streamed articles.
///
/// Cheap to clone; each run gets its own [`RunContext`].
#[derive(Clone)]
pub struct Pipeline {
    embedder: Option<Arc<dyn Embedder>>,
    generator: Arc<dyn Generator>,
    options: PipelineOptions,
}

/// State owned by a single run.
struct RunContext {
    run_id: RunId,
    chunker: Chunker,
    embedder: Option<Arc<dyn Embedder>>,
    generator: Arc<dyn Generator>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(generator: Arc<dyn Generator>, options: PipelineOptions) -> Self {
        Self {
            embedder: None,
            generator,
            options,
        }
    }

    /// Attach the embedding capability used for semantic chunking and clustering.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn context(&self) -> RunContext {
        let mut chunker = Chunker::new(self.options.chunking.clone());
        if let Some(embedder) = &self.embedder {
            chunker = chunker.with_embedder(embedder.clone());
        }
        RunContext {
            run_id: RunId::new(),
            chunker,
            embedder: self.embedder.clone(),
            generator: self.generator.clone(),
            options: self.options.clone(),
        }
    }

    /// Write an article from raw conversation text.
    #[instrument(skip_all, fields(chars = raw_text.len()))]
    pub fn run(&self, raw_text: String) -> BoxStream<'static, ProgressEvent> {
        let ctx = self.context();
        info!(run_id = %ctx.run_id, "starting text run");

        Box::pin(stream! {
            yield ProgressEvent::status(0, "Initializing...");
            let mut events = article_events(ctx, raw_text);
            while let Some(event) = events.next().await {
                yield event;
            }
        })
    }

    /// Write an article from already extracted messages.
    #[instrument(skip_all, fields(messages = messages.len()))]
    pub fn run_messages(&self, messages: Vec<Message>) -> BoxStream<'static, ProgressEvent> {
        self.run(render_transcript(&messages))
    }

    /// Fetch a shared conversation page and write an article from it.
    ///
    /// The fetch happens before the first event, so a fetch failure yields a
    /// single terminal error event.
    #[instrument(skip_all, fields(url = %url))]
    pub fn run_url(
        &self,
        fetcher: Arc<dyn PageFetcher>,
        url: String,
    ) -> BoxStream<'static, ProgressEvent> {
        let ctx = self.context();
        info!(run_id = %ctx.run_id, %url, "starting url run");

        Box::pin(stream! {
            let html = match fetcher.fetch(&url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(run_id = %ctx.run_id, error = %e, "fetch failed");
                    yield ProgressEvent::failed(e);
                    return;
                }
            };
            yield ProgressEvent::status(10, "Content fetched");

            yield ProgressEvent::status(30, "Extracting data...");
            let transcript = match extract_transcript(&html) {
                Ok(transcript) => transcript,
                Err(e) => {
                    warn!(run_id = %ctx.run_id, error = %e, "extraction failed");
                    yield ProgressEvent::failed(ChatscribeError::from(e));
                    return;
                }
            };
            info!(
                run_id = %ctx.run_id,
                messages = transcript.messages.len(),
                title = transcript.title.as_deref().unwrap_or(""),
                "conversation extracted"
            );

            yield ProgressEvent::status(50, "Processing messages...");
            let text = render_transcript(&transcript.messages);
            let mut events = article_events(ctx, text);
            while let Some(event) = events.next().await {
                yield event;
            }
        })
    }
}

/// Normalize, chunk, optionally cluster, then stream every section.
fn article_events(ctx: RunContext, raw: String) -> BoxStream<'static, ProgressEvent> {
    Box::pin(stream! {
        let run_id = ctx.run_id.clone();

        yield ProgressEvent::status(55, "Normalizing text...");
        let text = normalize(&raw);
        if text.is_empty() {
            yield ProgressEvent::failed(ChatscribeError::validation("no conversation text to write about"));
            return;
        }

        yield ProgressEvent::status(60, "Chunking text...");
        let mut chunks = ctx.chunker.chunk(&text).await;
        info!(%run_id, chunks = chunks.len(), "text chunked");

        if ctx.options.cluster {
            yield ProgressEvent::status(65, "Clustering chunks...");
            match &ctx.embedder {
                Some(embedder) => {
                    match cluster_chunks(chunks.clone(), embedder.as_ref(), &ctx.options.clustering).await {
                        Ok(kept) => {
                            info!(%run_id, before = chunks.len(), after = kept.len(), "chunks clustered");
                            chunks = kept;
                        }
                        Err(e) => warn!(%run_id, error = %e, "clustering failed, keeping all chunks"),
                    }
                }
                None => warn!(%run_id, "clustering requested without an embedder, keeping all chunks"),
            }
        }

        yield ProgressEvent::status(70, "Generating blog...");
        let total = chunks.len();
        let mut context = ContextManager::new(ctx.generator.clone());
        let mut article = Article::new();
        let mut written = 0usize;

        for (index, chunk) in chunks.iter().enumerate() {
            let request = SectionRequest::new(
                index,
                total,
                chunk,
                context.summary(),
                article.as_str(),
                ctx.options.trailing_window_words,
            );
            let prompted_summary = context.summary().clone();
            let percent = request.percent();
            let status = request.status();

            let mut increments = match ctx.generator.stream(&request.prompt).await {
                Ok(increments) => increments,
                Err(e) => {
                    warn!(%run_id, section = index + 1, error = %e, "section generation failed, skipping");
                    continue;
                }
            };

            article.begin_section();
            let mark = article.len();
            while let Some(increment) = increments.next().await {
                match increment {
                    Ok(piece) => {
                        if let Some(forwarded) = article.push(&piece) {
                            yield ProgressEvent::text(percent, status.as_str(), forwarded);
                        }
                    }
                    Err(e) => {
                        warn!(%run_id, section = index + 1, error = %e, "section stream failed, skipping rest");
                        break;
                    }
                }
            }
            drop(increments);

            let section = article.since(mark);
            if section.trim().is_empty() {
                warn!(%run_id, section = index + 1, "section produced no text");
                continue;
            }
            written += 1;
            debug!(%run_id, section = index + 1, position = ?request.position, chars = section.len(), "section written");

            if !prompted_summary.is_empty() {
                let ratio = trigram_overlap(section, &prompted_summary.digest);
                if ratio > ctx.options.overlap_warn_ratio {
                    warn!(%run_id, section = index + 1, ratio, "section repeats the running summary");
                }
            }

            context.refresh(article.as_str()).await;
        }

        if written == 0 {
            warn!(%run_id, sections = total, "no sections were generated");
            yield ProgressEvent::failed(ChatscribeError::Generation(
                "no blog sections could be generated".into(),
            ));
            return;
        }

        info!(%run_id, sections = written, chars = article.len(), "article complete");
        yield ProgressEvent::completed();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chatscribe_llm::TextStream;
    use chatscribe_shared::{Result, Role, SUCCESS_STATUS};
    use chatscribe_text::split_sentences;
    use futures::stream;

    /// Streams `Section N body.` for the Nth call and summarizes by counting calls.
    #[derive(Default)]
    struct MockGenerator {
        fail_sections: HashSet<usize>,
        fail_midway: HashSet<usize>,
        stream_prompts: Mutex<Vec<String>>,
        summary_prompts: Mutex<Vec<String>>,
    }

    impl MockGenerator {
        fn failing(sections: &[usize]) -> Self {
            Self {
                fail_sections: sections.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Generator for MockGenerator {
        async fn complete(&self, prompt: &str) -> Result<String> {
            let mut prompts = self.summary_prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            Ok(format!("Summary after {} sections.", prompts.len()))
        }

        async fn stream(&self, prompt: &str) -> Result<TextStream> {
            let n = {
                let mut prompts = self.stream_prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                prompts.len()
            };
            if self.fail_sections.contains(&n) {
                return Err(ChatscribeError::Generation("rate limited".into()));
            }
            let mut pieces: Vec<Result<String>> =
                vec![Ok(format!("Section {n}")), Ok(String::new()), Ok(" body.".into())];
            if self.fail_midway.contains(&n) {
                pieces.truncate(1);
                pieces.push(Err(ChatscribeError::Generation("connection reset".into())));
            }
            Ok(Box::pin(stream::iter(pieces)))
        }
    }

    struct StaticFetcher(Result<String>);

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<String> {
            match &self.0 {
                Ok(html) => Ok(html.clone()),
                Err(e) => Err(ChatscribeError::Fetch(e.to_string())),
            }
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed_batch(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(ChatscribeError::Embedding("offline".into()))
        }
    }

    fn small_chunks() -> PipelineOptions {
        let mut options = PipelineOptions::default();
        options.chunking.semantic = false;
        options.chunking.target_chars = 120;
        options.chunking.overlap_chars = 20;
        options
    }

    fn long_conversation() -> String {
        (0..12)
            .map(|i| {
                format!(
                    "[User]: Question {i} about feeding a starter? \
                     [ChatGPT Response]: Answer {i} is to feed it daily."
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn assert_well_formed(events: &[ProgressEvent]) {
        assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
        let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1, "exactly one terminal event");
        assert!(events.last().unwrap().is_terminal());
        assert!(events.last().unwrap().chunk.is_none());
    }

    fn article_of(events: &[ProgressEvent]) -> String {
        events.iter().filter_map(|e| e.chunk.as_deref()).collect()
    }

    #[tokio::test]
    async fn single_message_takes_first_and_only_path() {
        let generator = Arc::new(MockGenerator::default());
        let pipeline = Pipeline::new(generator.clone(), PipelineOptions::default());

        let events: Vec<ProgressEvent> = pipeline
            .run_messages(vec![Message::new(Role::User, "How do I keep a starter alive?")])
            .collect()
            .await;

        assert_well_formed(&events);
        let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
        assert_eq!(&percents[..4], &[0, 55, 60, 70]);
        assert_eq!(events.last().unwrap().status, SUCCESS_STATUS);
        assert_eq!(article_of(&events), "Section 1 body.");

        let prompts = generator.stream_prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("[First and only part of the chat]"));
        assert!(prompts[0].contains("[User]: How do I keep a starter alive?"));
    }

    /// Streams a fixed reply, one sentence per increment.
    struct ScriptedGenerator {
        reply: Vec<&'static str>,
        stream_calls: Mutex<usize>,
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok("A starter care guide.".into())
        }

        async fn stream(&self, _prompt: &str) -> Result<TextStream> {
            *self.stream_calls.lock().unwrap() += 1;
            let pieces: Vec<Result<String>> =
                self.reply.iter().map(|s| Ok(s.to_string())).collect();
            Ok(Box::pin(stream::iter(pieces)))
        }
    }

    fn fifty_word_question() -> String {
        "I started a sourdough starter last week using whole wheat flour and tap water, \
         and it bubbled nicely for three days before going flat and smelling like nail \
         polish remover. Should I feed it more often, switch to bottled water, move it \
         somewhere warmer, or throw it out and begin again with a fresh jar?"
            .to_string()
    }

    #[tokio::test]
    async fn single_long_message_repeats_no_sentence_more_than_twice() {
        let question = fifty_word_question();
        assert!((45..=55).contains(&question.split_whitespace().count()));

        let generator = Arc::new(ScriptedGenerator {
            reply: vec![
                "Keep the starter warm. ",
                "Feed it flour and water twice a day. ",
                "Keep the starter warm. ",
                "Discard half before each feeding.",
            ],
            stream_calls: Mutex::new(0),
        });
        let pipeline = Pipeline::new(generator.clone(), PipelineOptions::default());
        let events: Vec<ProgressEvent> = pipeline
            .run_messages(vec![Message::new(Role::User, question)])
            .collect()
            .await;

        assert_well_formed(&events);
        assert_eq!(events.last().unwrap().status, SUCCESS_STATUS);
        assert_eq!(*generator.stream_calls.lock().unwrap(), 1);

        let article = article_of(&events);
        assert!(!article.trim().is_empty());

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for sentence in split_sentences(&article) {
            *counts.entry(sentence).or_default() += 1;
        }
        assert_eq!(counts.get("Keep the starter warm."), Some(&2));
        assert!(counts.values().all(|&n| n <= 2), "{counts:?}");
    }

    #[tokio::test]
    async fn multi_section_run_is_ordered_and_separated() {
        let generator = Arc::new(MockGenerator::default());
        let pipeline = Pipeline::new(generator.clone(), small_chunks());

        let events: Vec<ProgressEvent> = pipeline.run(long_conversation()).collect().await;
        assert_well_formed(&events);

        let sections = generator.stream_prompts.lock().unwrap().len();
        assert!(sections > 2);
        let expected: Vec<String> = (1..=sections).map(|n| format!("Section {n} body.")).collect();
        assert_eq!(article_of(&events), expected.join("\n"));

        let text_percents: Vec<u8> =
            events.iter().filter(|e| e.chunk.is_some()).map(|e| e.percent).collect();
        assert!(text_percents.iter().all(|p| (70..=95).contains(p)));
    }

    #[tokio::test]
    async fn summary_is_refreshed_from_the_whole_article() {
        let generator = Arc::new(MockGenerator::default());
        let pipeline = Pipeline::new(generator.clone(), small_chunks());
        let _: Vec<ProgressEvent> = pipeline.run(long_conversation()).collect().await;

        let summaries = generator.summary_prompts.lock().unwrap();
        let streams = generator.stream_prompts.lock().unwrap();
        assert_eq!(summaries.len(), streams.len());
        for (i, prompt) in summaries.iter().enumerate() {
            for n in 1..=i + 1 {
                assert!(prompt.contains(&format!("Section {n} body.")));
            }
        }

        assert!(streams[0].contains("[First part of chat with more to come]"));
        assert!(streams[1].contains("[Middle section of the blog]"));
        assert!(streams[1].contains("Summary after 1 sections."));
        assert!(streams[1].contains("[Last 200 words to maintain narrative]: Section 1 body."));
        assert!(streams.last().unwrap().contains("[Last section of the blog]"));
    }

    #[tokio::test]
    async fn failed_section_is_skipped() {
        let generator = Arc::new(MockGenerator::failing(&[2]));
        let pipeline = Pipeline::new(generator.clone(), small_chunks());
        let events: Vec<ProgressEvent> = pipeline.run(long_conversation()).collect().await;

        assert_well_formed(&events);
        assert_eq!(events.last().unwrap().status, SUCCESS_STATUS);
        let article = article_of(&events);
        assert!(article.starts_with("Section 1 body.\nSection 3 body."));
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_forwarded_text() {
        let generator = Arc::new(MockGenerator {
            fail_midway: [1].into_iter().collect(),
            ..MockGenerator::default()
        });
        let pipeline = Pipeline::new(generator, small_chunks());
        let events: Vec<ProgressEvent> = pipeline.run(long_conversation()).collect().await;

        assert_well_formed(&events);
        assert!(article_of(&events).starts_with("Section 1\nSection 2 body."));
    }

    #[tokio::test]
    async fn all_sections_failing_is_one_error_event() {
        let generator = Arc::new(MockGenerator::failing(&[1]));
        let pipeline = Pipeline::new(generator, PipelineOptions::default());
        let events: Vec<ProgressEvent> = pipeline.run("Just one line.".into()).collect().await;

        assert_well_formed(&events);
        assert!(events.last().unwrap().is_error());
    }

    #[tokio::test]
    async fn empty_text_fails_cleanly() {
        let pipeline = Pipeline::new(Arc::new(MockGenerator::default()), PipelineOptions::default());
        let events: Vec<ProgressEvent> = pipeline.run(" \n\t ".into()).collect().await;

        assert_well_formed(&events);
        assert!(events.last().unwrap().is_error());
    }

    #[tokio::test]
    async fn fetch_failure_is_a_single_error_event() {
        let pipeline = Pipeline::new(Arc::new(MockGenerator::default()), PipelineOptions::default());
        let fetcher = Arc::new(StaticFetcher(Err(ChatscribeError::Fetch("404 Not Found".into()))));

        let events: Vec<ProgressEvent> = pipeline
            .run_url(fetcher, "https://chatgpt.com/share/missing".into())
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert!(events[0].is_error());
        assert_eq!(events[0].percent, 100);
        assert!(events[0].chunk.is_none());
    }

    #[tokio::test]
    async fn url_run_extracts_and_writes() {
        let html = std::fs::read_to_string("../../../fixtures/html/shared-conversation.html")
            .expect("fixture");
        let generator = Arc::new(MockGenerator::default());
        let pipeline = Pipeline::new(generator.clone(), PipelineOptions::default());

        let events: Vec<ProgressEvent> = pipeline
            .run_url(Arc::new(StaticFetcher(Ok(html))), "https://chatgpt.com/share/x".into())
            .collect()
            .await;

        assert_well_formed(&events);
        let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
        assert_eq!(&percents[..4], &[10, 30, 50, 55]);
        assert_eq!(events.last().unwrap().status, SUCCESS_STATUS);

        let prompt = &generator.stream_prompts.lock().unwrap()[0];
        assert!(prompt.contains("[User]: My sourdough starter smells like nail polish remover"));
        assert!(prompt.contains("[ChatGPT Response]: Not at all."));
    }

    #[tokio::test]
    async fn extraction_failure_ends_the_run() {
        let pipeline = Pipeline::new(Arc::new(MockGenerator::default()), PipelineOptions::default());
        let fetcher = Arc::new(StaticFetcher(Ok("<html><body>nothing</body></html>".into())));

        let events: Vec<ProgressEvent> = pipeline
            .run_url(fetcher, "https://chatgpt.com/share/x".into())
            .collect()
            .await;

        assert_well_formed(&events);
        assert_eq!(events.len(), 3);
        assert!(events[2].status.starts_with("Error:"));
        assert!(events[2].status.contains("no JSON found"));
    }

    #[tokio::test]
    async fn clustering_failure_keeps_all_chunks() {
        let mut options = small_chunks();
        options.chunking.semantic = true;
        options.cluster = true;
        let generator = Arc::new(MockGenerator::default());
        let pipeline =
            Pipeline::new(generator.clone(), options).with_embedder(Arc::new(FailingEmbedder));

        let events: Vec<ProgressEvent> = pipeline.run(long_conversation()).collect().await;
        assert_well_formed(&events);
        assert!(events.iter().any(|e| e.percent == 65));
        assert_eq!(events.last().unwrap().status, SUCCESS_STATUS);

        let expected = chatscribe_text::size_chunks(
            &normalize(&long_conversation()),
            120,
            20,
        );
        assert_eq!(generator.stream_prompts.lock().unwrap().len(), expected.len());
    }

    /// Flags when the completion stream it rides on is dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl DropFlag {
        fn touch(&self) {}
    }

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    struct EndlessGenerator(Arc<AtomicBool>);

    #[async_trait]
    impl Generator for EndlessGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(String::new())
        }

        async fn stream(&self, _prompt: &str) -> Result<TextStream> {
            let flag = DropFlag(self.0.clone());
            let endless = stream::iter(vec![Ok("Once".to_string())])
                .chain(stream::pending())
                .map(move |item| {
                    flag.touch();
                    item
                });
            Ok(Box::pin(endless))
        }
    }

    #[tokio::test]
    async fn dropping_the_run_drops_the_completion_stream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let pipeline = Pipeline::new(
            Arc::new(EndlessGenerator(dropped.clone())),
            PipelineOptions::default(),
        );

        let mut events = pipeline.run("Tell me about starters.".into());
        loop {
            let event = events.next().await.expect("run ended early");
            if event.chunk.is_some() {
                break;
            }
        }
        assert!(!dropped.load(Ordering::SeqCst));

        drop(events);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
