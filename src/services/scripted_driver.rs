//! 脚本驱动 - 业务能力层
//!
//! 页面操作全部来自任务文件里的 JS 片段，`{{payload}}` / `{{submission}}` /
//! `{{artifact}}` 在执行前替换为 JSON

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

use crate::error::WorkError;
use crate::infrastructure::ExecutionContext;
use crate::models::{ArtifactRef, DriverScripts, WorkItem};
use crate::services::artifact_fetcher::ArtifactFetcher;
use crate::services::work_driver::{Artifact, Submission, WorkDriver};

pub struct ScriptedDriver {
    scripts: DriverScripts,
    fetcher: ArtifactFetcher,
    placeholder: Regex,
}

impl ScriptedDriver {
    pub fn new(scripts: DriverScripts, fetcher: ArtifactFetcher) -> Result<Self, regex::Error> {
        Ok(Self {
            scripts,
            fetcher,
            placeholder: Regex::new(r"\{\{\s*(payload|submission|artifact)\s*\}\}")?,
        })
    }

    /// 替换模板中的占位符，没有提供的占位符替换为 null
    fn render(&self, template: &str, vars: &[(&str, &JsonValue)]) -> String {
        self.placeholder
            .replace_all(template, |caps: &Captures| {
                vars.iter()
                    .find(|(name, _)| *name == &caps[1])
                    .map(|(_, value)| value.to_string())
                    .unwrap_or_else(|| "null".to_string())
            })
            .into_owned()
    }

    fn payload_json(item: &WorkItem) -> JsonValue {
        let payload = &item.payload;
        json!({
            "prompt": payload.prompt,
            "class": payload.class,
            "attachment": payload.attachment.as_ref().map(|p| p.display().to_string()),
            "options": payload.options,
            "sequence_index": item.sequence_index,
            "retry_count": item.retry_count,
        })
    }

    fn submission_json(submission: &Submission) -> JsonValue {
        json!({ "id": submission.id, "raw": submission.raw })
    }
}

#[async_trait]
impl WorkDriver for ScriptedDriver {
    async fn reset(&self, ctx: &dyn ExecutionContext) -> Result<(), WorkError> {
        ctx.navigate(&self.scripts.baseline_url).await?;
        Ok(())
    }

    async fn submit(
        &self,
        ctx: &dyn ExecutionContext,
        item: &WorkItem,
    ) -> Result<Submission, WorkError> {
        if let Some(attachment) = &item.payload.attachment {
            let selector = self.scripts.upload_selector.as_deref().ok_or_else(|| {
                WorkError::submission("任务带有附件，但没有配置 upload_selector")
            })?;
            ctx.set_input_files(selector, std::slice::from_ref(attachment))
                .await
                .map_err(|e| WorkError::submission(e.to_string()))?;
            info!(
                "#{} 📎 已上传附件 {}",
                item.sequence_index + 1,
                attachment.display()
            );
        }

        let payload = Self::payload_json(item);
        let script = self.render(&self.scripts.submit_js, &[("payload", &payload)]);
        let result = ctx.evaluate(&script).await?;
        parse_submission(result)
    }

    async fn check_ready(
        &self,
        ctx: &dyn ExecutionContext,
        submission: &Submission,
    ) -> Result<Option<Artifact>, WorkError> {
        let submission = Self::submission_json(submission);
        let script = self.render(&self.scripts.ready_js, &[("submission", &submission)]);
        let result = ctx.evaluate(&script).await?;
        parse_readiness(result)
    }

    async fn fetch(
        &self,
        ctx: &dyn ExecutionContext,
        item: &WorkItem,
        artifact: Artifact,
    ) -> Result<Vec<ArtifactRef>, WorkError> {
        let script = self.render(&self.scripts.fetch_js, &[("artifact", &artifact.raw)]);
        let urls = parse_urls(ctx.evaluate(&script).await?)?;
        debug!("#{} 共 {} 个产物待下载", item.sequence_index + 1, urls.len());

        let stem = format!("{}_{:03}", item.batch_tag, item.sequence_index + 1);
        self.fetcher.fetch_all(&urls, &stem).await
    }
}

/// `{ok: true, id?}` 视为成功，其余都是提交失败
fn parse_submission(result: JsonValue) -> Result<Submission, WorkError> {
    if result.get("ok").and_then(JsonValue::as_bool) == Some(true) {
        let id = match result.get("id") {
            Some(JsonValue::String(id)) => Some(id.clone()),
            Some(JsonValue::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        return Ok(Submission { id, raw: result });
    }

    let reason = result
        .get("error")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("提交脚本返回 {}", result));
    Err(WorkError::submission(reason))
}

fn parse_readiness(result: JsonValue) -> Result<Option<Artifact>, WorkError> {
    match result {
        JsonValue::Null | JsonValue::Bool(false) => Ok(None),
        value if value.get("rejected").and_then(JsonValue::as_bool) == Some(true) => {
            Err(WorkError::submission("artifact rejected"))
        }
        value => Ok(Some(Artifact { raw: value })),
    }
}

fn parse_urls(result: JsonValue) -> Result<Vec<String>, WorkError> {
    match result {
        JsonValue::String(url) => Ok(vec![url]),
        JsonValue::Array(items) => Ok(items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .filter(|url| !url.is_empty())
            .collect()),
        other => Err(WorkError::artifact_fetch(format!(
            "取产物脚本应返回 URL 数组，实际为 {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::models::Payload;
    use crate::test_support::FakeContext;

    fn with_attachment(path: &str) -> WorkItem {
        let mut payload = Payload::new("make it move");
        payload.attachment = Some(PathBuf::from(path));
        WorkItem::new(0, payload, "b1")
    }

    fn driver() -> ScriptedDriver {
        let scripts = DriverScripts {
            baseline_url: "https://example.com/create".into(),
            submit_js: "submit({{payload}})".into(),
            ready_js: "ready({{ submission }})".into(),
            fetch_js: "urls({{artifact}}, {{payload}})".into(),
            upload_selector: Some("input[type=file]".into()),
        };
        ScriptedDriver::new(scripts, ArtifactFetcher::new(std::env::temp_dir())).unwrap()
    }

    #[test]
    fn test_render_substitutes_json() {
        let driver = driver();
        let item = WorkItem::new(2, Payload::new(r#"a "quoted" fox"#), "b1");
        let payload = ScriptedDriver::payload_json(&item);
        let script = driver.render("submit({{payload}})", &[("payload", &payload)]);
        assert!(script.starts_with("submit({"));
        assert!(script.contains(r#""prompt":"a \"quoted\" fox""#));
        assert!(script.contains(r#""sequence_index":2"#));
    }

    #[test]
    fn test_missing_placeholder_becomes_null() {
        let driver = driver();
        let artifact = json!({"u": 1});
        let script = driver.render("urls({{artifact}}, {{payload}})", &[("artifact", &artifact)]);
        assert_eq!(script, r#"urls({"u":1}, null)"#);
    }

    #[test]
    fn test_parse_submission() {
        let ok = parse_submission(json!({"ok": true, "id": 42})).unwrap();
        assert_eq!(ok.id.as_deref(), Some("42"));

        let err = parse_submission(json!({"ok": false, "error": "输入框不存在"})).unwrap_err();
        assert_eq!(err.to_string(), "提交失败: 输入框不存在");

        assert!(parse_submission(JsonValue::Null).is_err());
    }

    #[test]
    fn test_parse_readiness() {
        assert_eq!(parse_readiness(JsonValue::Null).unwrap(), None);
        assert_eq!(parse_readiness(json!(false)).unwrap(), None);

        let rejected = parse_readiness(json!({"rejected": true})).unwrap_err();
        assert_eq!(
            rejected.reason(),
            crate::error::ErrorReason::SubmissionError("artifact rejected".into())
        );

        let ready = parse_readiness(json!({"url": "https://x/y.mp4"})).unwrap();
        assert!(ready.is_some());
    }

    #[test]
    fn test_parse_urls() {
        assert_eq!(
            parse_urls(json!(["https://a/1.png", "", 3])).unwrap(),
            vec!["https://a/1.png".to_string()]
        );
        assert_eq!(parse_urls(json!("https://a/1.png")).unwrap().len(), 1);
        assert!(parse_urls(json!({"x": 1})).is_err());
    }

    #[tokio::test]
    async fn test_attachment_uploaded_before_submit_script() {
        let driver = driver();
        let ctx = FakeContext::clean().with_eval_result(json!({"ok": true, "id": "v1"}));

        let submission = driver.submit(&ctx, &with_attachment("inputs/fox.png")).await.unwrap();
        assert_eq!(submission.id.as_deref(), Some("v1"));
        assert_eq!(
            ctx.calls(),
            vec![
                "upload input[type=file] inputs/fox.png".to_string(),
                "evaluate".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_no_upload_without_attachment() {
        let driver = driver();
        let ctx = FakeContext::clean().with_eval_result(json!({"ok": true}));

        driver
            .submit(&ctx, &WorkItem::new(0, Payload::new("a cat"), "b1"))
            .await
            .unwrap();
        assert_eq!(ctx.calls(), vec!["evaluate".to_string()]);
    }

    #[tokio::test]
    async fn test_upload_failure_is_submission_error() {
        let driver = driver();
        let ctx = FakeContext::broken().with_eval_result(json!({"ok": true}));

        let err = driver
            .submit(&ctx, &with_attachment("inputs/fox.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkError::Submission { .. }));
        assert!(!ctx.calls().contains(&"evaluate".to_string()));
    }

    #[tokio::test]
    async fn test_attachment_without_selector_is_rejected() {
        let mut driver = driver();
        driver.scripts.upload_selector = None;
        let ctx = FakeContext::clean().with_eval_result(json!({"ok": true}));

        let err = driver
            .submit(&ctx, &with_attachment("inputs/fox.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkError::Submission { .. }));
        assert!(ctx.calls().is_empty());
    }
}
