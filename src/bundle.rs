//! Job bundles: the three documents describing one submission, written
//! side by side into a directory.

use std::fs;

use camino::Utf8Path;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::assets::{self, AssetReferences, AssetReferencesFile};
use crate::config::SubmitterSettings;
use crate::error::{BundleError, SubmitError};
use crate::graph::StepGraph;
use crate::host::{Host, Node};
use crate::params::{self, ParameterValues};
use crate::template::{self, JobTemplate};

pub const TEMPLATE_FILE: &str = "template.yaml";
pub const PARAMETER_VALUES_FILE: &str = "parameter_values.yaml";
pub const ASSET_REFERENCES_FILE: &str = "asset_references.yaml";

#[derive(Debug, Clone, PartialEq)]
pub struct JobBundle {
    pub template: JobTemplate,
    pub parameter_values: ParameterValues,
    pub asset_references: AssetReferences,
}

impl JobBundle {
    /// Compiles the bundle of the submitting operator `rop`. The asset
    /// references are the ones the user confirmed on the operator.
    pub fn compile<H>(host: &H, rop: &str, settings: &SubmitterSettings) -> Result<Self, SubmitError>
    where
        H: Host + ?Sized,
    {
        let node = Node::new(host, rop);
        let steps = StepGraph::extract(host, rop, &settings.submitter_node_types)?;

        Ok(Self {
            template: template::compile(&node, &steps, settings)?,
            parameter_values: params::compile(&node)?,
            asset_references: assets::from_node_lists(&node)?,
        })
    }

    /// Writes the bundle into `dir`, creating it if needed. A failure part
    /// way through leaves the files written so far in place.
    pub fn write(&self, dir: &Utf8Path) -> Result<(), BundleError> {
        fs::create_dir_all(dir).map_err(|err| BundleError::Io(dir.to_path_buf(), err))?;

        write_yaml(dir, TEMPLATE_FILE, &self.template)?;
        write_yaml(dir, PARAMETER_VALUES_FILE, &self.parameter_values)?;
        write_yaml(dir, ASSET_REFERENCES_FILE, &self.asset_references.to_document())?;

        tracing::info!(%dir, job = %self.template.name, "wrote job bundle");
        Ok(())
    }

    /// Reads a bundle previously written by [`JobBundle::write`].
    pub fn read(dir: &Utf8Path) -> Result<Self, BundleError> {
        let references: AssetReferencesFile = read_yaml(dir, ASSET_REFERENCES_FILE)?;

        Ok(Self {
            template: read_yaml(dir, TEMPLATE_FILE)?,
            parameter_values: read_yaml(dir, PARAMETER_VALUES_FILE)?,
            asset_references: references.into(),
        })
    }
}

fn write_yaml<T>(dir: &Utf8Path, name: &'static str, document: &T) -> Result<(), BundleError>
where
    T: Serialize,
{
    let text = serde_yaml::to_string(document).map_err(|err| BundleError::Yaml(name, err))?;
    let path = dir.join(name);
    fs::write(&path, text).map_err(|err| BundleError::Io(path, err))
}

fn read_yaml<T>(dir: &Utf8Path, name: &'static str) -> Result<T, BundleError>
where
    T: DeserializeOwned,
{
    let path = dir.join(name);
    let text = fs::read_to_string(&path).map_err(|err| BundleError::Io(path, err))?;
    serde_yaml::from_str(&text).map_err(|err| BundleError::Yaml(name, err))
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::assets::INPUT_FILENAMES;
    use crate::host::fake::FakeHost;

    const SUBMITTER: &str = "/out/deadline_cloud1";

    fn scene() -> FakeHost {
        FakeHost::new()
            .with_submitter(SUBMITTER)
            .with_node("/out/mantra1", "Driver", "ifd")
            .with_list(SUBMITTER, INPUT_FILENAMES, &["/proj/shot.hip"])
            .with_plan(
                SUBMITTER,
                "0 [ ] /out/mantra1 \t( 1 4 1 )\n1 [ 0 ] /out/deadline_cloud1 \t( 1 )\n",
            )
    }

    #[test]
    fn test_compile() {
        let bundle = JobBundle::compile(&scene(), SUBMITTER, &SubmitterSettings::default()).unwrap();

        assert_eq!(bundle.template.steps.len(), 1);
        assert_eq!(bundle.parameter_values.parameter_values.len(), 4);
        assert_eq!(bundle.asset_references.input_filenames.len(), 1);
    }

    #[test]
    fn test_compile_host_failure() {
        let host = scene().with_failing_plan(SUBMITTER, "Error: unknown node");

        let result = JobBundle::compile(&host, SUBMITTER, &SubmitterSettings::default());

        assert!(matches!(result, Err(SubmitError::Extract(_))));
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(dir.path().join("bundle")).unwrap();
        let bundle = JobBundle::compile(&scene(), SUBMITTER, &SubmitterSettings::default()).unwrap();

        bundle.write(&dir).unwrap();

        for name in [TEMPLATE_FILE, PARAMETER_VALUES_FILE, ASSET_REFERENCES_FILE] {
            assert!(dir.join(name).is_file(), "{name} missing");
        }
        let text = fs::read_to_string(dir.join(TEMPLATE_FILE)).unwrap();
        assert!(text.starts_with("specificationVersion: jobtemplate-2023-09\n"));

        assert_eq!(JobBundle::read(&dir).unwrap(), bundle);
    }

    #[test]
    fn test_write_into_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).unwrap();
        let bundle = JobBundle::compile(&scene(), SUBMITTER, &SubmitterSettings::default()).unwrap();

        assert!(matches!(bundle.write(&path), Err(BundleError::Io(p, _)) if p == path));
    }
}
