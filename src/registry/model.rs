//! The instrumented project model: files, classes, methods, statements and branches.
//!
//! This is the structural side of the registry - which regions of instrumented source
//! exist and which [`ContextSet`] applies to each. The element kinds are a closed set,
//! so post-merge context remapping is a plain match over them rather than open dispatch.
//!
//! All element types are plain owned data with public fields; the registry owns the tree
//! and hands out references. Each type carries its own binary codec, used by the session
//! segment layer in [`crate::registry::update`].

use crate::context::ContextSet;
use crate::io::{TaggedDataInput, TaggedDataOutput};
use crate::Result;

/// A source region covered by an element, in 1-based lines and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceRegion {
    /// First line of the region
    pub start_line: u32,
    /// First column of the region
    pub start_column: u32,
    /// Last line of the region
    pub end_line: u32,
    /// Last column of the region
    pub end_column: u32,
}

impl SourceRegion {
    pub(crate) fn write(&self, out: &mut TaggedDataOutput) {
        out.write_u32(self.start_line);
        out.write_u32(self.start_column);
        out.write_u32(self.end_line);
        out.write_u32(self.end_column);
    }

    pub(crate) fn read(input: &mut TaggedDataInput<'_>) -> Result<Self> {
        Ok(SourceRegion {
            start_line: input.read_u32()?,
            start_column: input.read_u32()?,
            end_line: input.read_u32()?,
            end_column: input.read_u32()?,
        })
    }
}

/// One recorded branch, with the contexts that apply to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    /// Source region of the branch expression
    pub region: SourceRegion,
    /// Contexts applying to this branch
    pub context: ContextSet,
    /// Cyclomatic complexity contributed by the branch
    pub complexity: u32,
}

/// One recorded statement, with the contexts that apply to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementInfo {
    /// Source region of the statement
    pub region: SourceRegion,
    /// Contexts applying to this statement
    pub context: ContextSet,
    /// Cyclomatic complexity contributed by the statement
    pub complexity: u32,
}

/// One recorded method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// The method signature as written in source
    pub signature: String,
    /// Source region of the whole method
    pub region: SourceRegion,
    /// Contexts applying to the method itself
    pub context: ContextSet,
    /// Cyclomatic complexity of the method
    pub complexity: u32,
    /// Statements recorded inside the method
    pub statements: Vec<StatementInfo>,
    /// Branches recorded inside the method
    pub branches: Vec<BranchInfo>,
}

/// One recorded class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    /// Fully qualified class name
    pub name: String,
    /// Source region of the class body
    pub region: SourceRegion,
    /// Methods recorded in the class
    pub methods: Vec<MethodInfo>,
}

/// One instrumented source file and its recorded structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Path of the file, relative to the project root
    pub name: String,
    /// Source encoding, if it was recorded at instrumentation time
    pub encoding: Option<String>,
    /// Modification timestamp of the file when instrumented, millis since the epoch
    pub timestamp: u64,
    /// Size of the file in bytes when instrumented
    pub filesize: u64,
    /// Checksum of the file content when instrumented
    pub checksum: u64,
    /// First coverage slot allocated to this file
    pub data_index: u32,
    /// Number of coverage slots allocated to this file
    pub data_length: u32,
    /// Classes recorded in the file
    pub classes: Vec<ClassInfo>,
    /// Registry versions this record is valid for, newest first.
    ///
    /// Extended, never content-replaced, when an older session re-encounters a file that
    /// a newer session already contributed.
    pub supported_versions: Vec<u64>,
}

impl FileInfo {
    /// Returns true if this record is valid for registry version `version`
    #[must_use]
    pub fn supports_version(&self, version: u64) -> bool {
        self.supported_versions.contains(&version)
    }

    pub(crate) fn add_supported_version(&mut self, version: u64) {
        if !self.supported_versions.contains(&version) {
            self.supported_versions.push(version);
        }
    }

    pub(crate) fn write(&self, out: &mut TaggedDataOutput) {
        out.write_str(&self.name);
        out.write_opt_str(self.encoding.as_deref());
        out.write_u64(self.timestamp);
        out.write_u64(self.filesize);
        out.write_u64(self.checksum);
        out.write_u32(self.data_index);
        out.write_u32(self.data_length);
        out.write_u32(self.supported_versions.len() as u32);
        for &version in &self.supported_versions {
            out.write_u64(version);
        }
        out.write_u32(self.classes.len() as u32);
        for class in &self.classes {
            class.write(out);
        }
    }

    pub(crate) fn read(input: &mut TaggedDataInput<'_>) -> Result<Self> {
        let name = input.read_str()?;
        let encoding = input.read_opt_str()?;
        let timestamp = input.read_u64()?;
        let filesize = input.read_u64()?;
        let checksum = input.read_u64()?;
        let data_index = input.read_u32()?;
        let data_length = input.read_u32()?;
        let version_count = input.read_u32()? as usize;
        let supported_versions = (0..version_count)
            .map(|_| input.read_u64())
            .collect::<Result<Vec<_>>>()?;
        let class_count = input.read_u32()? as usize;
        let classes = (0..class_count)
            .map(|_| ClassInfo::read(input))
            .collect::<Result<Vec<_>>>()?;
        Ok(FileInfo {
            name,
            encoding,
            timestamp,
            filesize,
            checksum,
            data_index,
            data_length,
            classes,
            supported_versions,
        })
    }
}

impl ClassInfo {
    pub(crate) fn write(&self, out: &mut TaggedDataOutput) {
        out.write_str(&self.name);
        self.region.write(out);
        out.write_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.write(out);
        }
    }

    pub(crate) fn read(input: &mut TaggedDataInput<'_>) -> Result<Self> {
        let name = input.read_str()?;
        let region = SourceRegion::read(input)?;
        let method_count = input.read_u32()? as usize;
        let methods = (0..method_count)
            .map(|_| MethodInfo::read(input))
            .collect::<Result<Vec<_>>>()?;
        Ok(ClassInfo {
            name,
            region,
            methods,
        })
    }
}

impl MethodInfo {
    pub(crate) fn write(&self, out: &mut TaggedDataOutput) {
        out.write_str(&self.signature);
        self.region.write(out);
        out.write_u64_run(self.context.words());
        out.write_u32(self.complexity);
        out.write_u32(self.statements.len() as u32);
        for statement in &self.statements {
            statement.region.write(out);
            out.write_u64_run(statement.context.words());
            out.write_u32(statement.complexity);
        }
        out.write_u32(self.branches.len() as u32);
        for branch in &self.branches {
            branch.region.write(out);
            out.write_u64_run(branch.context.words());
            out.write_u32(branch.complexity);
        }
    }

    pub(crate) fn read(input: &mut TaggedDataInput<'_>) -> Result<Self> {
        let signature = input.read_str()?;
        let region = SourceRegion::read(input)?;
        let context = ContextSet::from_words(input.read_u64_run()?);
        let complexity = input.read_u32()?;
        let statement_count = input.read_u32()? as usize;
        let statements = (0..statement_count)
            .map(|_| {
                Ok(StatementInfo {
                    region: SourceRegion::read(input)?,
                    context: ContextSet::from_words(input.read_u64_run()?),
                    complexity: input.read_u32()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let branch_count = input.read_u32()? as usize;
        let branches = (0..branch_count)
            .map(|_| {
                Ok(BranchInfo {
                    region: SourceRegion::read(input)?,
                    context: ContextSet::from_words(input.read_u64_run()?),
                    complexity: input.read_u32()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MethodInfo {
            signature,
            region,
            context,
            complexity,
            statements,
            branches,
        })
    }
}

/// The versioned project model owned by a registry.
#[derive(Debug, Clone, Default)]
pub struct ProjectInfo {
    /// Project name
    pub name: String,
    /// Current registry version; moves with every applied update
    pub version: u64,
    /// Instrumented files, in first-seen order
    pub files: Vec<FileInfo>,
}

impl ProjectInfo {
    /// Creates an empty project model at version 0
    #[must_use]
    pub fn new(name: &str) -> Self {
        ProjectInfo {
            name: name.to_string(),
            version: 0,
            files: Vec::new(),
        }
    }

    /// Looks up a file record by name
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&FileInfo> {
        self.files.iter().find(|file| file.name == name)
    }
}
