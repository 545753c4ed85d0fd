use crate::context::BuildContext;
use crate::pipeline::{Step, StepAction};
use crate::ui::Ui;
use crate::CoreError;
use podbake_runtime::Driver;
use podbake_schema::LoginSection;
use std::sync::Arc;
use tracing::warn;

/// A registry login that is logged out when dropped.
pub struct LoginSession<'a> {
    driver: &'a dyn Driver,
    ui: &'a dyn Ui,
    server: String,
}

impl<'a> LoginSession<'a> {
    pub fn begin(
        driver: &'a dyn Driver,
        ui: &'a dyn Ui,
        login: &LoginSection,
    ) -> Result<Self, CoreError> {
        ui.say(&format!("Logging in to {}...", login.server));
        driver.login(&login.server, &login.username, &login.password)?;
        Ok(Self {
            driver,
            ui,
            server: login.server.clone(),
        })
    }
}

impl Drop for LoginSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.driver.logout(&self.server) {
            warn!("failed to log out of {}: {e}", self.server);
            self.ui
                .error(&format!("Error logging out of {}: {e}", self.server));
        }
    }
}

/// Pulls the base image, inside a login session when one is configured.
#[derive(Debug, Default)]
pub struct StepPull;

impl Step for StepPull {
    fn name(&self) -> &'static str {
        "pull"
    }

    fn run(&mut self, ctx: &mut BuildContext) -> StepAction {
        let config = Arc::clone(&ctx.config);
        if !config.pull {
            ctx.ui.say("Skipping pull of base image");
            return StepAction::Continue;
        }

        let driver = Arc::clone(&ctx.driver);
        let ui = Arc::clone(&ctx.ui);
        let session = match &config.login {
            Some(login) => match LoginSession::begin(driver.as_ref(), ui.as_ref(), login) {
                Ok(session) => Some(session),
                Err(e) => return ctx.fail(e),
            },
            None => None,
        };

        ui.say(&format!("Pulling image {}...", config.image));
        let pulled = driver.pull(&config.image);
        drop(session);

        match pulled {
            Ok(()) => StepAction::Continue,
            Err(e) => ctx.fail(e),
        }
    }
}
