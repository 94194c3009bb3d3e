#![forbid(unsafe_code)]
//! Command-line parsing for the `-key=value` surface.
//!
//! One command per line: `mkdisk`, `rmdisk`, `fdisk`, `mount`, `unmount`,
//! `rep`, plus the shell-local `mounted` and `exit`. Blank lines and `#`
//! comments are skipped by the caller.

use vdisk_core::ops::{CreateKind, DeleteMode};
use vdisk_error::{Result, VdiskError};
use vdisk_types::FitPolicy;

const KIB: i64 = 1024;
const MIB: i64 = 1024 * 1024;

/// A parsed front-end command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Mkdisk {
        path: String,
        size: i64,
        fit: FitPolicy,
    },
    Rmdisk {
        path: String,
    },
    FdiskCreate {
        path: String,
        name: String,
        size: i64,
        kind: CreateKind,
        fit: FitPolicy,
    },
    FdiskDelete {
        path: String,
        name: String,
        mode: DeleteMode,
    },
    FdiskAdd {
        path: String,
        name: String,
        delta: i64,
    },
    Mount {
        path: String,
        name: String,
    },
    Unmount {
        id: String,
    },
    Rep {
        id: String,
        path: String,
        json: bool,
    },
    Mounted,
    Exit,
}

fn invalid(message: impl Into<String>) -> VdiskError {
    VdiskError::InvalidArguments(message.into())
}

/// Split a token into `(key, value)`. Bare flags get an empty value.
fn split_flag(token: &str) -> Result<(String, &str)> {
    let Some(stripped) = token.strip_prefix('-') else {
        return Err(invalid(format!("unexpected token {token}")));
    };
    match stripped.split_once('=') {
        Some((key, value)) => Ok((key.to_ascii_lowercase(), value)),
        None => Ok((stripped.to_ascii_lowercase(), "")),
    }
}

fn parse_size(value: &str, flag: &str) -> Result<i64> {
    let size: i64 = value
        .parse()
        .map_err(|_| invalid(format!("{flag} must be an integer, got {value:?}")))?;
    Ok(size)
}

fn unit_multiplier(value: &str, allow_bytes: bool) -> Result<i64> {
    match value.to_ascii_lowercase().as_str() {
        "b" if allow_bytes => Ok(1),
        "k" => Ok(KIB),
        "m" => Ok(MIB),
        _ => Err(invalid(format!("invalid unit {value:?}"))),
    }
}

/// Parse one command line.
pub fn parse(line: &str) -> Result<Command> {
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Err(invalid("empty command"));
    };
    let args: Vec<&str> = tokens.collect();

    match verb.to_ascii_lowercase().as_str() {
        "mkdisk" => parse_mkdisk(&args),
        "rmdisk" => parse_rmdisk(&args),
        "fdisk" => parse_fdisk(&args),
        "mount" => parse_mount(&args),
        "unmount" => parse_unmount(&args),
        "rep" => parse_rep(&args),
        "mounted" => Ok(Command::Mounted),
        "exit" | "quit" => Ok(Command::Exit),
        other => Err(invalid(format!("unknown command {other}"))),
    }
}

fn parse_mkdisk(args: &[&str]) -> Result<Command> {
    let mut size = None;
    let mut fit = FitPolicy::First;
    let mut unit = MIB;
    let mut path = None;

    for token in args {
        let (key, value) = split_flag(token)?;
        match key.as_str() {
            "size" => {
                let parsed = parse_size(value, "-size")?;
                if parsed <= 0 {
                    return Err(invalid("-size must be greater than zero"));
                }
                size = Some(parsed);
            }
            "fit" => fit = FitPolicy::parse_flag(value).map_err(|err| invalid(err.to_string()))?,
            "unit" => unit = unit_multiplier(value, false)?,
            "path" => path = Some(value.to_owned()),
            other => return Err(invalid(format!("unknown mkdisk flag -{other}"))),
        }
    }

    let size = size.ok_or_else(|| invalid("missing -size"))?;
    let path = path.ok_or_else(|| invalid("missing -path"))?;
    Ok(Command::Mkdisk {
        path,
        size: size * unit,
        fit,
    })
}

fn parse_rmdisk(args: &[&str]) -> Result<Command> {
    let mut path = None;
    for token in args {
        let (key, value) = split_flag(token)?;
        match key.as_str() {
            "path" => path = Some(value.to_owned()),
            other => return Err(invalid(format!("unknown rmdisk flag -{other}"))),
        }
    }
    Ok(Command::Rmdisk {
        path: path.ok_or_else(|| invalid("missing -path"))?,
    })
}

fn parse_fdisk(args: &[&str]) -> Result<Command> {
    let mut size = None;
    let mut unit = KIB;
    let mut kind = CreateKind::Primary;
    let mut fit = FitPolicy::Worst;
    let mut path = None;
    let mut name = None;
    let mut delete_mode = None;
    let mut add = None;

    for token in args {
        let (key, value) = split_flag(token)?;
        match key.as_str() {
            "size" => {
                let parsed = parse_size(value, "-size")?;
                if parsed <= 0 {
                    return Err(invalid("-size must be greater than zero"));
                }
                size = Some(parsed);
            }
            "unit" => unit = unit_multiplier(value, true)?,
            "type" => {
                kind = match value.to_ascii_lowercase().as_str() {
                    "p" => CreateKind::Primary,
                    "e" => CreateKind::Extended,
                    "l" => CreateKind::Logical,
                    _ => return Err(invalid(format!("invalid -type {value:?} (use P, E or L)"))),
                }
            }
            "fit" => fit = FitPolicy::parse_flag(value).map_err(|err| invalid(err.to_string()))?,
            "path" => path = Some(value.to_owned()),
            "name" => name = Some(value.to_owned()),
            "delete" => {
                delete_mode = Some(match value.to_ascii_lowercase().as_str() {
                    "fast" => DeleteMode::Fast,
                    "full" => DeleteMode::Full,
                    _ => {
                        return Err(invalid(format!(
                            "invalid -delete {value:?} (use fast or full)"
                        )));
                    }
                });
            }
            "add" => add = Some(parse_size(value, "-add")?),
            other => return Err(invalid(format!("unknown fdisk flag -{other}"))),
        }
    }

    let path = path.ok_or_else(|| invalid("missing -path"))?;
    let name = name.ok_or_else(|| invalid("missing -name"))?;

    match (delete_mode, add, size) {
        (Some(_), Some(_), _) => Err(invalid("-delete and -add are mutually exclusive")),
        (Some(_), None, Some(_)) => Err(invalid("-size cannot be combined with -delete")),
        (None, Some(_), Some(_)) => Err(invalid("-size cannot be combined with -add")),
        (Some(mode), None, None) => Ok(Command::FdiskDelete { path, name, mode }),
        (None, Some(delta), None) => {
            if delta == 0 {
                return Err(invalid("-add must be non-zero"));
            }
            Ok(Command::FdiskAdd {
                path,
                name,
                delta: delta * unit,
            })
        }
        (None, None, Some(size)) => Ok(Command::FdiskCreate {
            path,
            name,
            size: size * unit,
            kind,
            fit,
        }),
        (None, None, None) => Err(invalid("one of -size, -delete or -add is required")),
    }
}

fn parse_mount(args: &[&str]) -> Result<Command> {
    let mut path = None;
    let mut name = None;
    for token in args {
        let (key, value) = split_flag(token)?;
        match key.as_str() {
            "path" => path = Some(value.to_owned()),
            "name" => name = Some(value.to_owned()),
            other => return Err(invalid(format!("unknown mount flag -{other}"))),
        }
    }
    Ok(Command::Mount {
        path: path.ok_or_else(|| invalid("missing -path"))?,
        name: name.ok_or_else(|| invalid("missing -name"))?,
    })
}

fn parse_unmount(args: &[&str]) -> Result<Command> {
    let mut id = None;
    for token in args {
        let (key, value) = split_flag(token)?;
        match key.as_str() {
            "id" => id = Some(value.to_owned()),
            other => return Err(invalid(format!("unknown unmount flag -{other}"))),
        }
    }
    Ok(Command::Unmount {
        id: id.ok_or_else(|| invalid("missing -id"))?,
    })
}

fn parse_rep(args: &[&str]) -> Result<Command> {
    let mut id = None;
    let mut path = None;
    let mut json = false;
    for token in args {
        let (key, value) = split_flag(token)?;
        match key.as_str() {
            "id" => id = Some(value.to_owned()),
            "path" => path = Some(value.to_owned()),
            "json" => json = true,
            other => return Err(invalid(format!("unknown rep flag -{other}"))),
        }
    }
    Ok(Command::Rep {
        id: id.ok_or_else(|| invalid("missing -id"))?,
        path: path.ok_or_else(|| invalid("missing -path"))?,
        json,
    })
}
