#![forbid(unsafe_code)]
//! Shell execution: runs parsed commands against the layout engine and the
//! mount registry, asking for confirmation before destructive operations.

use crate::command::{self, Command};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use vdisk_core::report::LayoutBlock;
use vdisk_core::{MountRegistry, MountedDisk, UnmountOutcome, ops, report};
use vdisk_error::VdiskError;

/// Answer to a destructive-operation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
    /// Anything that is not `y`/`n`; treated as cancellation.
    Invalid,
}

/// Confirmation source supplied by the front-end.
pub trait Confirmer {
    fn confirm(&mut self, prompt: &str) -> io::Result<Confirmation>;
}

/// Reads one line from standard input.
#[derive(Debug, Default)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&mut self, prompt: &str) -> io::Result<Confirmation> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(match answer.trim().to_ascii_lowercase().as_str() {
            "y" => Confirmation::Yes,
            "n" => Confirmation::No,
            _ => Confirmation::Invalid,
        })
    }
}

/// Always answers yes; for scripted runs and tests.
#[derive(Debug, Default)]
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> io::Result<Confirmation> {
        Ok(Confirmation::Yes)
    }
}

/// Whether the shell loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Exit,
}

/// Interactive shell / script runner state.
pub struct Shell<W: Write, C: Confirmer> {
    registry: MountRegistry,
    cwd: PathBuf,
    out: W,
    confirmer: C,
}

impl<W: Write, C: Confirmer> Shell<W, C> {
    pub fn new(cwd: PathBuf, out: W, confirmer: C) -> Self {
        Self {
            registry: MountRegistry::new(),
            cwd,
            out,
            confirmer,
        }
    }

    /// Tear down the shell, handing back the writer and confirmer.
    pub fn into_parts(self) -> (W, C) {
        (self.out, self.confirmer)
    }

    /// Resolve a user-supplied path against the shell working directory.
    fn resolve(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    /// Parse and execute one input line. Blank lines and `#` comments are
    /// no-ops; command errors are printed, not returned.
    pub fn run_line(&mut self, line: &str) -> io::Result<LineOutcome> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(LineOutcome::Continue);
        }
        match command::parse(trimmed) {
            Ok(Command::Exit) => Ok(LineOutcome::Exit),
            Ok(cmd) => {
                self.execute(cmd)?;
                Ok(LineOutcome::Continue)
            }
            Err(err) => {
                writeln!(self.out, "error: {err}")?;
                Ok(LineOutcome::Continue)
            }
        }
    }

    /// Print an engine result, downgrading a mirror desync to a warning.
    fn finish(&mut self, result: Result<String, VdiskError>) -> io::Result<()> {
        match result {
            Ok(message) => writeln!(self.out, "{message}"),
            Err(err) if err.primary_committed() => {
                warn!(target: "vdisk::cli", error = %err, "mirror desynced");
                writeln!(self.out, "warning: {err}")
            }
            Err(err) => writeln!(self.out, "error: {err}"),
        }
    }

    fn execute(&mut self, cmd: Command) -> io::Result<()> {
        match cmd {
            Command::Mkdisk { path, size, fit } => {
                let path = self.resolve(&path);
                let result = ops::create_disk(&path, size, fit)
                    .map(|()| format!("disk created: {} ({size} bytes)", path.display()));
                self.finish(result)
            }
            Command::Rmdisk { path } => {
                let path = self.resolve(&path);
                let pending = match ops::prepare_remove_disk(&path) {
                    Ok(pending) => pending,
                    Err(err) => return writeln!(self.out, "error: {err}"),
                };
                let prompt = format!(">> remove disk {}? [y/n]: ", path.display());
                match self.confirmer.confirm(&prompt)? {
                    Confirmation::Yes => {
                        let result = pending
                            .commit()
                            .map(|()| format!("disk removed: {}", path.display()));
                        self.finish(result)
                    }
                    Confirmation::No => writeln!(self.out, "operation cancelled"),
                    Confirmation::Invalid => {
                        writeln!(self.out, "invalid answer; operation cancelled")
                    }
                }
            }
            Command::FdiskCreate {
                path,
                name,
                size,
                kind,
                fit,
            } => {
                let path = self.resolve(&path);
                let result = ops::create_partition(&path, &name, kind, size, fit)
                    .map(|()| format!("partition {name} created ({size} bytes)"));
                self.finish(result)
            }
            Command::FdiskDelete { path, name, mode } => {
                let path = self.resolve(&path);
                let pending = match ops::prepare_delete_partition(&path, &name) {
                    Ok(pending) => pending,
                    Err(err) => return writeln!(self.out, "error: {err}"),
                };
                let prompt = format!(
                    ">> delete {} partition {name}? [y/n]: ",
                    pending.kind()
                );
                match self.confirmer.confirm(&prompt)? {
                    Confirmation::Yes => {
                        let kind = pending.kind().to_owned();
                        let result = pending
                            .commit(mode)
                            .map(|()| format!("{kind} partition {name} deleted"));
                        self.finish(result)
                    }
                    Confirmation::No => writeln!(self.out, "operation cancelled"),
                    Confirmation::Invalid => {
                        writeln!(self.out, "invalid answer; operation cancelled")
                    }
                }
            }
            Command::FdiskAdd { path, name, delta } => {
                let path = self.resolve(&path);
                let result = ops::resize_partition(&path, &name, delta)
                    .map(|new_size| format!("partition {name} resized to {new_size} bytes"));
                self.finish(result)
            }
            Command::Mount { path, name } => {
                let path = self.resolve(&path);
                match self.registry.mount(&path, &name) {
                    Ok(id) => {
                        writeln!(self.out, "mounted {name} as {id}")?;
                        let table = self
                            .registry
                            .disks()
                            .iter()
                            .find(|disk| disk.parts.iter().any(|part| part.id == id))
                            .map(render_mount_table);
                        if let Some(table) = table {
                            write!(self.out, "{table}")?;
                        }
                        Ok(())
                    }
                    Err(err) => writeln!(self.out, "error: {err}"),
                }
            }
            Command::Unmount { id } => match self.registry.unmount(&id) {
                Ok(UnmountOutcome::DiskRetained) => writeln!(self.out, "unmounted {id}"),
                Ok(UnmountOutcome::DiskReleased) => {
                    writeln!(self.out, "unmounted {id}; no partitions remain on the disk")
                }
                Err(err) => writeln!(self.out, "error: {err}"),
            },
            Command::Rep { id, path, json } => {
                let target = self.resolve(&path);
                let result = self
                    .registry
                    .path_for_id(&id)
                    .map(Path::to_path_buf)
                    .and_then(|disk_path| report::build_report(&disk_path));
                match result {
                    Ok(blocks) => {
                        let rendered = if json {
                            serde_json::to_string_pretty(&blocks)
                                .map_err(|err| io::Error::other(err.to_string()))?
                        } else {
                            render_report(&blocks)
                        };
                        fs::write(&target, &rendered)?;
                        write!(self.out, "{rendered}")?;
                        if !rendered.ends_with('\n') {
                            writeln!(self.out)?;
                        }
                        writeln!(self.out, "report written to {}", target.display())
                    }
                    Err(err) => writeln!(self.out, "error: {err}"),
                }
            }
            Command::Mounted => {
                if self.registry.disks().is_empty() {
                    writeln!(self.out, "no partitions mounted")
                } else {
                    for disk in self.registry.disks() {
                        writeln!(self.out, "{} ({})", disk.path.display(), disk.letter)?;
                        write!(self.out, "{}", render_mount_table(disk))?;
                    }
                    Ok(())
                }
            }
            Command::Exit => Ok(()),
        }
    }
}

fn render_mount_table(disk: &MountedDisk) -> String {
    let rule = "-".repeat(34);
    let mut table = format!("{rule}\n|       Mounted partitions      |\n{rule}\n");
    table.push_str(&format!("| {:<20}| {:<8}|\n{rule}\n", "Name", "ID"));
    for part in &disk.parts {
        table.push_str(&format!("| {:<20}| {:<8}|\n", part.name, part.id));
    }
    table.push_str(&format!("{rule}\n"));
    table
}

fn render_report(blocks: &[LayoutBlock]) -> String {
    let mut text = format!(
        "{:<18} {:>12} {:>12}  {}\n",
        "NAME", "START", "SIZE", "KIND"
    );
    for block in blocks {
        let name = if block.name.is_empty() { "-" } else { &block.name };
        text.push_str(&format!(
            "{:<18} {:>12} {:>12}  {}\n",
            name,
            block.start,
            block.size,
            block.kind.label()
        ));
    }
    text
}
