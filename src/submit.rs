//! The submitter's user actions. Each one reads the scene once, runs to
//! completion synchronously, and reports any failure to the user through the
//! host before returning.

use camino::Utf8PathBuf;

use crate::assets::{self, AssetReferences};
use crate::bundle::JobBundle;
use crate::config::{SubmissionContext, SubmitterSettings};
use crate::error::{SubmitError, TransportError};
use crate::farm::{
    self, AssetManager, CreateJobRequest, FarmClient, JobAttachmentSettings, ProgressDialog,
    UploadOutcome, UploadRequest,
};
use crate::graph::StepGraph;
use crate::history;
use crate::host::{Host, ParmValue, Severity};
use crate::params;

/// Title of every message the submitter shows.
pub const MESSAGE_TITLE: &str = "Houdini Job Submission";

const FARM_PARM: &str = "farm";
const QUEUE_PARM: &str = "queue";
const REFRESHING: &str = "<refreshing>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    BuildingBundle,
    ResolvingFarmContext,
    Uploading,
    SubmittingJob,
    Done,
    BuildFailed,
    Failed,
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub job_id: String,
    pub bundle_dir: Utf8PathBuf,
}

/// Runs submitter actions against one host scene.
#[derive(Debug)]
pub struct Submitter {
    settings: SubmitterSettings,
    state: SubmissionState,
    transitions: Vec<SubmissionState>,
}

impl Submitter {
    pub fn new(settings: SubmitterSettings) -> Self {
        Self {
            settings,
            state: SubmissionState::Idle,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    /// Every state entered by the latest action, in order.
    pub fn transitions(&self) -> &[SubmissionState] {
        &self.transitions
    }

    fn transition(&mut self, next: SubmissionState) {
        tracing::debug!(from = ?self.state, to = ?next, "submission state");
        self.state = next;
        self.transitions.push(next);
    }

    /// Ends an action: failures land in `failed` and are shown to the user,
    /// then the submitter goes back to idle.
    fn finish<T, H>(
        &mut self,
        host: &H,
        result: Result<T, SubmitError>,
        failed: SubmissionState,
    ) -> Result<T, SubmitError>
    where
        H: Host + ?Sized,
    {
        match &result {
            Ok(_) => self.transition(SubmissionState::Done),
            Err(err) => {
                self.transition(failed);
                report(host, err);
            }
        }

        self.transition(SubmissionState::Idle);
        result
    }

    /// Compiles the bundle of `rop` into a new job history directory.
    pub fn save_bundle<H>(
        &mut self,
        host: &H,
        rop: &str,
        context: &SubmissionContext,
    ) -> Result<Utf8PathBuf, SubmitError>
    where
        H: Host + ?Sized,
    {
        let _span = tracing::info_span!("save", rop).entered();

        self.transitions.clear();
        self.transition(SubmissionState::BuildingBundle);
        let result = self.build_bundle(host, rop, context).map(|(_, dir)| dir);
        let result = self.finish(host, result, SubmissionState::BuildFailed);

        if let Ok(dir) = &result {
            tracing::info!(%dir, "saved job bundle");
            host.display_message(
                MESSAGE_TITLE,
                &format!("Saved the submission as a job bundle: {dir}"),
                Severity::Message,
            );
        }

        result
    }

    /// Compiles and saves the bundle of `rop`, uploads its assets through
    /// `dialog`, then creates the job. The bundle stays on disk whatever
    /// happens after it was written.
    pub fn submit<H, C, D>(
        &mut self,
        host: &H,
        rop: &str,
        context: &SubmissionContext,
        client: &C,
        dialog: &mut D,
    ) -> Result<Submitted, SubmitError>
    where
        H: Host + ?Sized,
        C: FarmClient + ?Sized,
        D: ProgressDialog + ?Sized,
    {
        let _span = tracing::info_span!("submit", rop).entered();

        self.transitions.clear();
        let result = self.run_submit(host, rop, context, client, dialog);
        let result = self.finish(host, result, SubmissionState::Failed);

        if let Ok(submitted) = &result {
            tracing::info!(job_id = %submitted.job_id, "submitted job");
            host.display_message(
                MESSAGE_TITLE,
                &format!("Submitted job {}", submitted.job_id),
                Severity::Message,
            );
        }

        result
    }

    fn build_bundle<H>(
        &self,
        host: &H,
        rop: &str,
        context: &SubmissionContext,
    ) -> Result<(JobBundle, Utf8PathBuf), SubmitError>
    where
        H: Host + ?Sized,
    {
        let bundle = JobBundle::compile(host, rop, &self.settings)?;
        let dir = history::create_bundle_dir(
            &context.job_history_dir,
            &self.settings.name,
            &bundle.template.name,
            history::today(),
        )?;
        bundle.write(&dir)?;

        Ok((bundle, dir))
    }

    fn run_submit<H, C, D>(
        &mut self,
        host: &H,
        rop: &str,
        context: &SubmissionContext,
        client: &C,
        dialog: &mut D,
    ) -> Result<Submitted, SubmitError>
    where
        H: Host + ?Sized,
        C: FarmClient + ?Sized,
        D: ProgressDialog + ?Sized,
    {
        self.transition(SubmissionState::BuildingBundle);
        let (bundle, bundle_dir) = self.build_bundle(host, rop, context)?;

        self.transition(SubmissionState::ResolvingFarmContext);
        let (farm_id, queue_id) = context.target()?;
        let queue = client
            .get_queue(farm_id, queue_id)
            .map_err(TransportError::Client)?;
        let queue_display_name = farm::string_field(&queue, "get_queue", "displayName")?;
        let attachment_settings: JobAttachmentSettings =
            farm::typed_field(&queue, "get_queue", "jobAttachmentSettings")?;
        let session = client
            .get_queue_user_session(farm_id, queue_id, &queue_display_name)
            .map_err(TransportError::Client)?;

        let manager = AssetManager {
            farm_id: farm_id.to_string(),
            queue_id: queue_id.to_string(),
            settings: attachment_settings,
            session,
        };

        self.transition(SubmissionState::Uploading);
        let request = UploadRequest {
            farm_id: farm_id.to_string(),
            queue_id: queue_id.to_string(),
            storage_profile_id: context.storage_profile_id.clone(),
            bundle_dir: bundle_dir.clone(),
            asset_references: bundle.asset_references.clone(),
            auto_accept: context.auto_accept,
        };
        let attachments = match dialog.upload_attachments(&request, &manager) {
            UploadOutcome::Completed(attachments) => attachments,
            UploadOutcome::Canceled => return Err(TransportError::Canceled.into()),
            UploadOutcome::Failed(message) => return Err(TransportError::Upload(message).into()),
        };

        self.transition(SubmissionState::SubmittingJob);
        let response = client
            .create_job(&CreateJobRequest {
                farm_id,
                queue_id,
                storage_profile_id: context.storage_profile_id.as_deref(),
                template: &bundle.template,
                parameter_values: &bundle.parameter_values,
                attachments: &attachments,
            })
            .map_err(TransportError::Client)?;

        Ok(Submitted {
            job_id: farm::string_field(&response, "create_job", "jobId")?,
            bundle_dir,
        })
    }

    /// Scans the scene for assets and replaces the path lists on `rop` with
    /// the result, for the user to review before submitting.
    pub fn scan_assets<H>(&self, host: &mut H, rop: &str) -> Result<AssetReferences, SubmitError>
    where
        H: Host + ?Sized,
    {
        let _span = tracing::info_span!("scan", rop).entered();

        let result = StepGraph::extract(&*host, rop, &self.settings.submitter_node_types)
            .map_err(SubmitError::from)
            .map(|steps| assets::scan_scene(&*host, rop, &steps, &self.settings));

        match result {
            Ok(refs) => {
                assets::populate_node_lists(host, rop, &refs);
                Ok(refs)
            }
            Err(err) => {
                report(&*host, &err);
                Err(err)
            }
        }
    }

    /// Shows the configured farm and queue on `rop` and caches the queue's
    /// parameter definitions. Both fields are blanked if the refresh fails.
    pub fn refresh_farm<H, C>(
        &self,
        host: &mut H,
        rop: &str,
        context: &SubmissionContext,
        client: &C,
    ) -> Result<(), SubmitError>
    where
        H: Host + ?Sized,
        C: FarmClient + ?Sized,
    {
        let _span = tracing::info_span!("refresh", rop).entered();

        host.set_parm(rop, FARM_PARM, REFRESHING.into());
        host.set_parm(rop, QUEUE_PARM, REFRESHING.into());

        let result = refresh_display_names(host, rop, context, client)
            .and_then(|()| store_queue_parameters(host, rop, context, client));

        if let Err(err) = &result {
            self.clear_farm(host, rop);
            report(&*host, err);
        }
        result
    }

    /// Blanks the farm and queue shown on `rop`.
    pub fn clear_farm<H>(&self, host: &mut H, rop: &str)
    where
        H: Host + ?Sized,
    {
        host.set_parm(rop, FARM_PARM, ParmValue::String(String::new()));
        host.set_parm(rop, QUEUE_PARM, ParmValue::String(String::new()));
    }

    /// Re-caches the queue's parameter definitions on `rop`.
    pub fn update_queue_parameters<H, C>(
        &self,
        host: &mut H,
        rop: &str,
        context: &SubmissionContext,
        client: &C,
    ) -> Result<(), SubmitError>
    where
        H: Host + ?Sized,
        C: FarmClient + ?Sized,
    {
        let _span = tracing::info_span!("queue_parameters", rop).entered();

        let result = store_queue_parameters(host, rop, context, client);
        if let Err(err) = &result {
            report(&*host, err);
        }
        result
    }
}

fn report<H>(host: &H, err: &SubmitError)
where
    H: Host + ?Sized,
{
    tracing::warn!(%err, "submitter action failed");
    host.display_message(MESSAGE_TITLE, &err.to_string(), Severity::Warning);
}

fn refresh_display_names<H, C>(
    host: &mut H,
    rop: &str,
    context: &SubmissionContext,
    client: &C,
) -> Result<(), SubmitError>
where
    H: Host + ?Sized,
    C: FarmClient + ?Sized,
{
    let (farm_id, queue_id) = context.target()?;

    let farm = client.get_farm(farm_id).map_err(TransportError::Client)?;
    let farm_name = farm::string_field(&farm, "get_farm", "displayName")?;
    host.set_parm(rop, FARM_PARM, farm_name.into());

    let queue = client
        .get_queue(farm_id, queue_id)
        .map_err(TransportError::Client)?;
    let queue_name = farm::string_field(&queue, "get_queue", "displayName")?;
    host.set_parm(rop, QUEUE_PARM, queue_name.into());

    Ok(())
}

fn store_queue_parameters<H, C>(
    host: &mut H,
    rop: &str,
    context: &SubmissionContext,
    client: &C,
) -> Result<(), SubmitError>
where
    H: Host + ?Sized,
    C: FarmClient + ?Sized,
{
    let (farm_id, queue_id) = context.target()?;
    let definitions = client
        .queue_parameter_definitions(farm_id, queue_id)
        .map_err(TransportError::Client)?;

    tracing::debug!(count = definitions.len(), "fetched queue parameter definitions");
    params::store_queue_parameter_definitions(host, rop, &definitions)
}
