use std::error::Error;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Turns a graph description into an artifact on disk.
pub trait Renderer {
    fn render(&self, description: &str, output: &Path) -> Result<(), RenderError>;
}

#[derive(Debug)]
pub enum RenderError {
    /// The layout program could not be started at all.
    Spawn { program: PathBuf, source: io::Error },
    /// Writing the description or the artifact failed.
    Io { path: PathBuf, source: io::Error },
    /// The layout program ran and rejected the description.
    Failed {
        program: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { program, source } => {
                write!(f, "failed to start {}: {source}", program.display())
            }
            Self::Io { path, source } => write!(f, "I/O error on {}: {source}", path.display()),
            Self::Failed {
                program,
                code,
                stderr,
            } => {
                let code = code.map_or_else(|| "signal".to_owned(), |c| c.to_string());
                write!(
                    f,
                    "{} exited with {code}: {}",
                    program.display(),
                    stderr.trim()
                )
            }
        }
    }
}

impl Error for RenderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn { source, .. } | Self::Io { source, .. } => Some(source),
            Self::Failed { .. } => None,
        }
    }
}

/// Runs the Graphviz `dot` program, feeding the description on stdin.
#[derive(Debug, Clone)]
pub struct GraphvizCommand {
    program: PathBuf,
    format: String,
}

impl Default for GraphvizCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from("dot"),
            format: "svg".to_owned(),
        }
    }
}

impl GraphvizCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path or name of the layout program, `dot` by default.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Output format passed as `-T<format>`, `svg` by default.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }
}

impl Renderer for GraphvizCommand {
    fn render(&self, description: &str, output: &Path) -> Result<(), RenderError> {
        let mut child = Command::new(&self.program)
            .arg(format!("-T{}", self.format))
            .arg("-o")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A broken pipe here means the program died early; its exit status says why.
            if let Err(err) = stdin.write_all(description.as_bytes())
                && err.kind() != io::ErrorKind::BrokenPipe
            {
                return Err(RenderError::Io {
                    path: self.program.clone(),
                    source: err,
                });
            }
        }

        let result = child
            .wait_with_output()
            .map_err(|source| RenderError::Io {
                path: self.program.clone(),
                source,
            })?;
        if !result.status.success() {
            return Err(RenderError::Failed {
                program: self.program.clone(),
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            });
        }
        tracing::info!(output = %output.display(), format = %self.format, "rendered graph");
        Ok(())
    }
}

/// Writes the description itself, for when no layout program is around.
#[derive(Debug, Default, Clone, Copy)]
pub struct DotFile;

impl Renderer for DotFile {
    fn render(&self, description: &str, output: &Path) -> Result<(), RenderError> {
        std::fs::write(output, description).map_err(|source| RenderError::Io {
            path: output.to_owned(),
            source,
        })?;
        tracing::info!(output = %output.display(), "wrote graph description");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lockscope-{}-{name}", std::process::id()))
    }

    #[test]
    fn dot_file_writes_the_description() {
        let path = scratch_path("plain.dot");
        DotFile
            .render("digraph lockscope {}\n", &path)
            .expect("write succeeds");
        let written = std::fs::read_to_string(&path).expect("file exists");
        assert_eq!(written, "digraph lockscope {}\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn dot_file_reports_io_errors() {
        let path = scratch_path("missing-dir").join("graph.dot");
        let err = DotFile
            .render("digraph lockscope {}\n", &path)
            .expect_err("parent directory does not exist");
        assert!(matches!(err, RenderError::Io { .. }), "{err}");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let renderer = GraphvizCommand::new().program("lockscope-no-such-layout-program");
        let err = renderer
            .render("digraph lockscope {}\n", &scratch_path("never.svg"))
            .expect_err("program does not exist");
        assert!(matches!(err, RenderError::Spawn { .. }), "{err}");
        assert!(err.source().is_some());
    }
}
