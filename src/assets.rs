//! Files and directories a job needs uploaded or allow-listed.
//!
//! There are two ways to collect them, kept as separate functions because
//! their filtering rules differ:
//!
//! * [`scan_scene`] is a best-effort discovery heuristic over the whole scene,
//!   surfaced to the user for review.
//! * [`from_node_lists`] reads back exactly what the user confirmed on the
//!   submitting operator, without any filtering.

use std::collections::BTreeSet;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::config::SubmitterSettings;
use crate::error::SubmitError;
use crate::graph::StepGraph;
use crate::host::{Host, Node};

pub const INPUT_FILENAMES: &str = "input_filenames";
pub const INPUT_DIRECTORIES: &str = "input_directories";
pub const OUTPUT_DIRECTORIES: &str = "output_directories";

/// Paths referenced by a job, deduplicated by exact string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetReferences {
    pub input_filenames: BTreeSet<String>,
    pub input_directories: BTreeSet<String>,
    pub output_directories: BTreeSet<String>,
}

impl AssetReferences {
    /// The `asset_references.yaml` document.
    pub fn to_document(&self) -> AssetReferencesDocument<'_> {
        AssetReferencesDocument {
            asset_references: AssetReferencesBody {
                inputs: Inputs {
                    filenames: &self.input_filenames,
                    directories: &self.input_directories,
                },
                outputs: Outputs {
                    directories: &self.output_directories,
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReferencesDocument<'a> {
    asset_references: AssetReferencesBody<'a>,
}

#[derive(Debug, Serialize)]
struct AssetReferencesBody<'a> {
    inputs: Inputs<'a>,
    outputs: Outputs<'a>,
}

#[derive(Debug, Serialize)]
struct Inputs<'a> {
    filenames: &'a BTreeSet<String>,
    directories: &'a BTreeSet<String>,
}

#[derive(Debug, Serialize)]
struct Outputs<'a> {
    directories: &'a BTreeSet<String>,
}

/// Owned mirror of [`AssetReferencesDocument`], for reading bundles back.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReferencesFile {
    pub asset_references: AssetReferencesFileBody,
}

#[derive(Debug, Deserialize)]
pub struct AssetReferencesFileBody {
    pub inputs: InputsFile,
    pub outputs: OutputsFile,
}

#[derive(Debug, Deserialize)]
pub struct InputsFile {
    #[serde(default)]
    pub filenames: BTreeSet<String>,
    #[serde(default)]
    pub directories: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
pub struct OutputsFile {
    #[serde(default)]
    pub directories: BTreeSet<String>,
}

impl From<AssetReferencesFile> for AssetReferences {
    fn from(file: AssetReferencesFile) -> Self {
        let body = file.asset_references;
        Self {
            input_filenames: body.inputs.filenames,
            input_directories: body.inputs.directories,
            output_directories: body.outputs.directories,
        }
    }
}

/// Discovers the scene's input files and the output directories of every
/// step in `steps`.
///
/// A scene reference is skipped when it is owned by `rop` itself, when its
/// value starts with one of the ignored pseudo-path prefixes, when its owning
/// parameter is on the denylist, or when it names an existing directory. The
/// open scene file is always included.
pub fn scan_scene<H>(
    host: &H,
    rop: &str,
    steps: &StepGraph,
    settings: &SubmitterSettings,
) -> AssetReferences
where
    H: Host + ?Sized,
{
    let mut refs = AssetReferences::default();
    refs.input_filenames.insert(host.scene_file());

    for reference in host.file_references() {
        if settings
            .ignore_ref_prefixes
            .iter()
            .any(|prefix| reference.path.starts_with(prefix.as_str()))
        {
            continue;
        }

        if let Some(parm) = &reference.parm {
            if parm.node == rop || settings.ignore_ref_parms.contains(&parm.name) {
                continue;
            }
        }

        if Utf8Path::new(&reference.path).is_dir() {
            continue;
        }

        refs.input_filenames.insert(reference.path);
    }

    for step in steps.steps() {
        let Some(node_type) = host.node_type(&step.rop) else {
            continue;
        };
        let Some(parm) = settings.output_parms.lookup(&node_type) else {
            continue;
        };
        let Some(value) = host.parm(&step.rop, parm) else {
            tracing::debug!(rop = %step.rop, parm, "output parameter not found");
            continue;
        };

        let path = value.as_string();
        if path.is_empty() {
            continue;
        }

        match Utf8Path::new(&path).parent() {
            Some(dir) if !dir.as_str().is_empty() => {
                refs.output_directories.insert(dir.to_string());
            }
            _ => {}
        }
    }

    tracing::debug!(
        inputs = refs.input_filenames.len(),
        outputs = refs.output_directories.len(),
        "scanned scene assets"
    );

    refs
}

/// Reads the three user-confirmed path lists off the submitting operator.
pub fn from_node_lists<H>(node: &Node<'_, H>) -> Result<AssetReferences, SubmitError>
where
    H: Host + ?Sized,
{
    Ok(AssetReferences {
        input_filenames: node.eval_path_list(INPUT_FILENAMES)?.into_iter().collect(),
        input_directories: node.eval_path_list(INPUT_DIRECTORIES)?.into_iter().collect(),
        output_directories: node.eval_path_list(OUTPUT_DIRECTORIES)?.into_iter().collect(),
    })
}

/// Replaces the operator's three path lists with `refs`, sorted.
pub fn populate_node_lists<H>(host: &mut H, rop: &str, refs: &AssetReferences)
where
    H: Host + ?Sized,
{
    let lists = [
        (INPUT_FILENAMES, &refs.input_filenames),
        (INPUT_DIRECTORIES, &refs.input_directories),
        (OUTPUT_DIRECTORIES, &refs.output_directories),
    ];

    for (name, paths) in lists {
        host.set_parm_list(rop, name, paths.iter().cloned().collect());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::host::fake::FakeHost;

    const SUBMITTER: &str = "/out/deadline_cloud1";

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn scene() -> FakeHost {
        FakeHost::new()
            .with_submitter(SUBMITTER)
            .with_node("/out/mantra1", "Driver", "ifd")
            .with_node("/out/opengl1", "Driver", "opengl")
            .with_node("/obj/geo1/filecache1", "Sop", "filecache")
            .with_parm("/out/mantra1", "vm_picture", "/renders/shot/beauty.$F4.exr")
            .with_parm("/out/opengl1", "picture", "/renders/flipbook/fb.$F4.jpg")
            .with_parm("/obj/geo1/filecache1", "file", "")
            .with_plan(
                SUBMITTER,
                "0 [ ] /obj/geo1/filecache1 \t( 1 10 1 )\n\
                 1 [ 0 ] /out/mantra1 \t( 1 10 1 )\n\
                 2 [ ] /out/opengl1 \t( 1 10 1 )\n\
                 3 [ 1 2 ] /out/deadline_cloud1 \t( 1 )\n",
            )
    }

    #[test]
    fn test_scan_scene() {
        let host = scene()
            .with_reference(Some(("/obj/geo1/file1", "file")), "/assets/tree.bgeo.sc")
            .with_reference(Some(("/obj/geo1/file2", "file")), "/assets/tree.bgeo.sc")
            .with_reference(Some(("/obj/geo1/file3", "file")), "opdef:/Sop/thing?icon.svg")
            .with_reference(Some(("/obj/geo1/file4", "file")), "temp:/scratch.bgeo")
            .with_reference(Some(("/tasks/topnet1", "pdg_workingdir")), "/proj/pdg")
            .with_reference(Some((SUBMITTER, "adaptor_wheels")), "/wheels/adaptor.whl")
            .with_reference(None, "/assets/hdri/sky.exr")
            .with_reference(None, "oplib:/Object/hlight?Object/hlight");
        let settings = SubmitterSettings::default();
        let graph = StepGraph::extract(&host, SUBMITTER, &settings.submitter_node_types).unwrap();

        let refs = scan_scene(&host, SUBMITTER, &graph, &settings);

        assert_eq!(
            refs.input_filenames,
            set(&["/assets/hdri/sky.exr", "/assets/tree.bgeo.sc", "/proj/shot.hip"])
        );
        assert!(refs.input_directories.is_empty());
        // opengl is not a mapped type and the file cache output is empty
        assert_eq!(refs.output_directories, set(&["/renders/shot"]));
    }

    #[test]
    fn test_scan_scene_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dir = dir.path().to_str().unwrap().to_string();
        let host = scene().with_reference(Some(("/obj/geo1/file1", "file")), &dir);
        let settings = SubmitterSettings::default();

        let refs = scan_scene(&host, SUBMITTER, &StepGraph::default(), &settings);

        assert_eq!(refs.input_filenames, set(&["/proj/shot.hip"]));
        assert!(refs.output_directories.is_empty());
    }

    #[test]
    fn test_from_node_lists_is_verbatim() {
        let host = FakeHost::new()
            .with_submitter(SUBMITTER)
            .with_list(SUBMITTER, INPUT_FILENAMES, &["opdef:/odd", "/a.hip", "/a.hip"])
            .with_list(SUBMITTER, INPUT_DIRECTORIES, &["/textures"])
            .with_list(SUBMITTER, OUTPUT_DIRECTORIES, &["/renders"]);

        let refs = from_node_lists(&Node::new(&host, SUBMITTER)).unwrap();

        assert_eq!(refs.input_filenames, set(&["/a.hip", "opdef:/odd"]));
        assert_eq!(refs.input_directories, set(&["/textures"]));
        assert_eq!(refs.output_directories, set(&["/renders"]));
    }

    #[test]
    fn test_from_node_lists_missing_list() {
        let host = FakeHost::new().with_node(SUBMITTER, "Driver", "deadline_cloud");

        assert!(matches!(
            from_node_lists(&Node::new(&host, SUBMITTER)),
            Err(SubmitError::MissingParameter { parm, .. }) if parm == INPUT_FILENAMES
        ));
    }

    #[test]
    fn test_populate_node_lists() {
        let mut host = FakeHost::new().with_submitter(SUBMITTER);
        let refs = AssetReferences {
            input_filenames: set(&["/b.bgeo", "/a.hip"]),
            input_directories: BTreeSet::new(),
            output_directories: set(&["/renders"]),
        };

        populate_node_lists(&mut host, SUBMITTER, &refs);

        let node = Node::new(&host, SUBMITTER);
        assert_eq!(node.eval_path_list(INPUT_FILENAMES).unwrap(), vec!["/a.hip", "/b.bgeo"]);
        assert!(node.eval_path_list(INPUT_DIRECTORIES).unwrap().is_empty());
        assert_eq!(from_node_lists(&node).unwrap(), refs);
    }

    #[test]
    fn test_document_shape() {
        let refs = AssetReferences {
            input_filenames: set(&["/a.hip"]),
            input_directories: set(&["/tex"]),
            output_directories: set(&["/out"]),
        };

        let yaml = serde_yaml::to_string(&refs.to_document()).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(value["assetReferences"]["inputs"]["filenames"][0], "/a.hip");
        assert_eq!(value["assetReferences"]["inputs"]["directories"][0], "/tex");
        assert_eq!(value["assetReferences"]["outputs"]["directories"][0], "/out");
    }
}
