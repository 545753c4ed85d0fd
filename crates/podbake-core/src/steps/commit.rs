use super::pull::LoginSession;
use crate::artifact::Artifact;
use crate::context::BuildContext;
use crate::pipeline::{Step, StepAction};
use crate::CoreError;
use podbake_runtime::CommitOptions;
use podbake_schema::PublishSection;
use tracing::debug;

/// Commits the container to an image, then tags and pushes it when a
/// `[publish]` section is configured.
#[derive(Debug, Default)]
pub struct StepCommit;

impl StepCommit {
    fn references(publish: &PublishSection) -> Vec<String> {
        if publish.tags.is_empty() {
            return vec![publish.repository.clone()];
        }
        publish
            .tags
            .iter()
            .map(|tag| format!("{}:{tag}", publish.repository))
            .collect()
    }

    fn publish(
        ctx: &BuildContext,
        image_id: &str,
        publish: &PublishSection,
    ) -> Result<Vec<String>, CoreError> {
        let references = Self::references(publish);
        for reference in &references {
            ctx.ui.say(&format!("Tagging image {image_id} as {reference}"));
            ctx.driver.tag_image(image_id, reference)?;
        }
        if publish.push {
            let _session = match &ctx.config.login {
                Some(login) => Some(LoginSession::begin(
                    ctx.driver.as_ref(),
                    ctx.ui.as_ref(),
                    login,
                )?),
                None => None,
            };
            for reference in &references {
                ctx.ui.say(&format!("Pushing {reference}..."));
                ctx.driver.push(reference)?;
            }
        }
        Ok(references)
    }

    fn commit(ctx: &BuildContext) -> Result<Artifact, CoreError> {
        let id = ctx.require_container_id()?;
        let config = &ctx.config;
        let options = CommitOptions {
            author: config.author.clone(),
            message: config.message.clone(),
            changes: config.changes.clone(),
        };

        ctx.ui.say("Committing the container");
        let image_id = ctx.driver.commit(id, &options)?;
        ctx.ui.message(&format!("Image ID: {image_id}"));

        let tags = match &config.publish {
            Some(publish) => Self::publish(ctx, &image_id, publish)?,
            None => Vec::new(),
        };

        let digest = match ctx.driver.image_digest(&image_id) {
            Ok(digest) if !digest.is_empty() => Some(digest),
            Ok(_) => None,
            Err(e) => {
                debug!("no digest for image {image_id}: {e}");
                None
            }
        };

        Ok(Artifact::Image {
            id: image_id,
            digest,
            tags,
        })
    }
}

impl Step for StepCommit {
    fn name(&self) -> &'static str {
        "commit"
    }

    fn run(&mut self, ctx: &mut BuildContext) -> StepAction {
        debug!("committing build of {}", ctx.config.image);
        match Self::commit(ctx) {
            Ok(artifact) => {
                ctx.artifact = Some(artifact);
                StepAction::Continue
            }
            Err(e) => ctx.fail(e),
        }
    }
}
