//! End-to-end session behaviour: commands, render completion, staleness

use futures::future::BoxFuture;
use futures::FutureExt;
use pmpm_document::{BibliographyRequest, RenderJob};
use pmpm_preview::{spawn, Command, NoopRenderer, RenderError, SessionConfig, SubRenderer};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_stream::StreamExt;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn update(blocks: &[(&str, &str)]) -> String {
    let blocks: Vec<_> = blocks.iter().map(|(h, c)| json!([h, c])).collect();
    json!({ "filepath": "test.md", "htmlblocks": blocks }).to_string()
}

fn bibliography(request: &BibliographyRequest, citations: &[&str]) -> String {
    let mut html = String::new();
    for c in citations {
        html.push_str(&format!(r#"<span class="citation">{}</span>"#, c));
    }
    json!({ "request-id": request.id.as_u64(), "html": html }).to_string()
}

struct FailingRenderer;

impl SubRenderer for FailingRenderer {
    fn render(&self, _job: &RenderJob) -> BoxFuture<'static, Result<String, RenderError>> {
        async { Err(RenderError::Failed("parse error".to_string())) }.boxed()
    }
}

struct PanickingRenderer;

impl SubRenderer for PanickingRenderer {
    fn render(&self, job: &RenderJob) -> BoxFuture<'static, Result<String, RenderError>> {
        let source = job.kind.source().to_string();
        async move {
            if source.starts_with("digraph") {
                panic!("renderer bug");
            }
            Ok(source)
        }
        .boxed()
    }
}

/// Holds every render until permits are added
struct GatedRenderer {
    gate: Arc<Semaphore>,
}

impl SubRenderer for GatedRenderer {
    fn render(&self, job: &RenderJob) -> BoxFuture<'static, Result<String, RenderError>> {
        let gate = self.gate.clone();
        let source = job.kind.source().to_string();
        async move {
            let _permit = gate
                .acquire()
                .await
                .map_err(|err| RenderError::Failed(err.to_string()))?;
            Ok(format!("<b>{}</b>", source))
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_update_render_and_bibliography() -> anyhow::Result<()> {
    init_tracing();
    let mut handle = spawn(SessionConfig::default(), Arc::new(NoopRenderer));
    handle
        .send_json(&update(&[(
            "a",
            r#"<p><span class="math inline">x</span> <span class="citation" data-cites="k">[@k]</span></p>"#,
        )]))
        .await?;

    let request = match handle.commands.next().await {
        Some(Command::RenderCitations(request)) => request,
        other => panic!("expected citation request, got {:?}", other),
    };
    assert_eq!(request.citations.len(), 1);
    assert_eq!(request.citations[0].citekeys, vec!["k"]);

    handle.send_json(&bibliography(&request, &["(K 2000)"])).await?;

    let (document, commands) = handle.finish().await?;
    let commands: Vec<Command> = commands.collect().await;

    let scrolls: Vec<_> = commands
        .iter()
        .filter(|c| matches!(c, Command::ScrollTo { .. }))
        .collect();
    assert_eq!(scrolls.len(), 1);
    assert!(matches!(scrolls[0], Command::ScrollTo { had_compare: false, .. }));
    assert_eq!(commands.last(), Some(&Command::RenderingDone));

    let block = document.block_nodes()[0];
    let citation = document.citations().citations_of(block)[0];
    assert_eq!(document.dom().text_content(citation), "(K 2000)");
    let math = document.dom().elements_with_class(block, "math")[0];
    assert_eq!(document.dom().text_content(math), "x");
    assert_eq!(document.pending_renders(), 0);
    Ok(())
}

#[tokio::test]
async fn test_render_for_removed_block_is_ignored() -> anyhow::Result<()> {
    init_tracing();
    let gate = Arc::new(Semaphore::new(0));
    let mut handle = spawn(
        SessionConfig::default(),
        Arc::new(GatedRenderer { gate: gate.clone() }),
    );

    handle
        .send_json(&update(&[("a", r#"<p><span class="math display">E=mc^2</span></p>"#)]))
        .await?;
    handle.send_json(&update(&[("b", "<p>plain</p>")])).await?;

    // The second pass has no renders and scrolls right away; the first
    // pass's scroll never fires because it was superseded
    match handle.commands.next().await {
        Some(Command::ScrollTo { had_compare, .. }) => assert!(had_compare),
        other => panic!("expected scroll, got {:?}", other),
    }

    gate.add_permits(8);
    let (document, commands) = handle.finish().await?;
    let rest: Vec<Command> = commands.collect().await;
    assert!(rest.iter().all(|c| !matches!(c, Command::ScrollTo { .. })));

    assert!(!document.to_html().contains("<b>"));
    assert_eq!(document.pending_renders(), 0);
    assert_eq!(document.blocks().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_render_is_annotated() -> anyhow::Result<()> {
    init_tracing();
    let handle = spawn(SessionConfig::default(), Arc::new(FailingRenderer));
    handle
        .send_json(&update(&[("m", r#"<p><span class="math inline">\bad</span></p>"#)]))
        .await?;
    let (document, _) = handle.finish().await?;

    let block = document.block_nodes()[0];
    let errors = document.dom().elements_with_class(block, "render-error");
    assert_eq!(errors.len(), 1);
    assert_eq!(document.dom().text_content(errors[0]), r"\bad (parse error)");
    Ok(())
}

#[tokio::test]
async fn test_panicking_renderer_does_not_kill_session() -> anyhow::Result<()> {
    init_tracing();
    let handle = spawn(SessionConfig::default(), Arc::new(PanickingRenderer));
    handle
        .send_json(&update(&[("g", r#"<pre class="dot-parse">digraph {}</pre>"#)]))
        .await?;
    handle
        .send_json(&update(&[
            ("g", r#"<pre class="dot-parse">digraph {}</pre>"#),
            ("p", "<p>after</p>"),
        ]))
        .await?;
    let (document, commands) = handle.finish().await?;
    let commands: Vec<Command> = commands.collect().await;

    assert_eq!(document.blocks().len(), 2);
    let errors = document.dom().elements_with_class(document.root(), "render-error");
    assert_eq!(errors.len(), 1);
    assert!(document.dom().text_content(errors[0]).contains("Renderer panicked"));
    assert!(commands.contains(&Command::RenderingDone));
    Ok(())
}

#[tokio::test]
async fn test_stale_bibliography_is_reissued() -> anyhow::Result<()> {
    init_tracing();
    let mut handle = spawn(SessionConfig::default(), Arc::new(NoopRenderer));
    let cite = r#"<p><span class="citation" data-cites="a">(A)</span></p>"#;

    handle.send_json(&update(&[("a", cite)])).await?;
    let first = match handle.commands.next().await {
        Some(Command::RenderCitations(request)) => request,
        other => panic!("expected citation request, got {:?}", other),
    };

    // A faster re-render adds a second citation of a known textcite, then
    // the slow answer to the first request arrives
    handle.send_json(&update(&[("a", cite), ("a2", cite)])).await?;
    handle.send_json(&bibliography(&first, &["(Alpha)"])).await?;

    let (document, commands) = handle.finish().await?;
    let commands: Vec<Command> = commands.collect().await;
    let reissued: Vec<&BibliographyRequest> = commands
        .iter()
        .filter_map(|c| match c {
            Command::RenderCitations(request) => Some(request),
            _ => None,
        })
        .collect();
    assert_eq!(reissued.len(), 1);
    assert!(reissued[0].id > first.id);
    assert_eq!(reissued[0].citations.len(), 2);
    assert!(!commands.contains(&Command::RenderingDone));

    for block in document.block_nodes() {
        let node = document.citations().citations_of(block)[0];
        assert_eq!(document.dom().text_content(node), "(A)");
    }
    Ok(())
}
