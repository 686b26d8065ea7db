//! The CLI front end over the Access Service, narrowed from `rocfl`'s `clap`-derive +
//! `enum_dispatch` command idiom (the original `cmd/opts.rs`/`cmd/cmds.rs` split) to the
//! read-only operations in spec §4.1. Rendering reuses `cmd::table` for tabular output.

pub mod opts;
pub mod table;

use std::fmt::{self, Display, Formatter};
use std::io;
use std::io::Write;

use ansi_term::Style;
use enum_dispatch::enum_dispatch;

use crate::cancel::CancelToken;
use crate::clock::RealClock;
use crate::cmd::opts::{CatCmd, DiffCmd, IndexArgs, IndexCmd, ListCmd, LogCmd, ShowCmd, SyncCmd};
use crate::cmd::table::{Alignment, AsRow, Column, ColumnId, Row, TableView, TextCell};
use crate::db::VersionSummary;
use crate::error::{IndexError, Result};
use crate::ocfl::{Diff, FsInventoryReader, InventoryPath, LocalStore};
use crate::service::{AccessService, DirEntry};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The concrete `AccessService` instantiation the CLI drives: a local-disk backing store, the
/// standard `inventory.json` reader over it, and the real wall clock. Only a local-disk backing
/// store ships with this crate (spec §6.3).
pub type Service = AccessService<FsInventoryReader<LocalStore>, LocalStore, RealClock>;

#[enum_dispatch]
pub trait Cmd {
    fn exec(&self, service: &Service, args: &IndexArgs, cancel: &CancelToken) -> Result<()>;
}

pub fn exec_command(args: &IndexArgs, service: &Service, cancel: &CancelToken) -> Result<()> {
    args.command.exec(service, args, cancel)
}

pub fn print_err(error: &IndexError, quiet: bool) {
    if quiet {
        return;
    }
    let style = Style::new().fg(ansi_term::Colour::Red);
    eprintln!("{}", style.paint(format!("Error: {error}")));
}

impl Cmd for ListCmd {
    fn exec(&self, service: &Service, args: &IndexArgs, cancel: &CancelToken) -> Result<()> {
        let version = self.version.unwrap_or(0);
        let path = self.path.as_deref().unwrap_or(".");

        // The object root is always a directory listing. A non-root `PATH` is stat'd first and
        // only falls back to a directory listing on `NotFound` -- `read_version_dir` itself
        // returns `NotFound` both for "this is actually a live file" and for "no such path at
        // all" (spec: "ReadVersionDir on a logical path that resolves to a live file ... returns
        // NotFound"), so branching on that error alone can't tell the two apart. Trying the stat
        // first resolves the ambiguity: it succeeds for a file, and a malformed PATH surfaces its
        // own `BadRequest` here without ever reaching the directory-listing fallback.
        let entries = if path.is_empty() || path == "." {
            service.read_version_dir(&self.object_id, version, path, cancel)?
        } else {
            match service.stat_version_file(&self.object_id, version, path, cancel) {
                Ok(entry) => vec![entry],
                Err(e) if e.is_not_found() => {
                    service.read_version_dir(&self.object_id, version, path, cancel)?
                }
                Err(e) => return Err(e),
            }
        };

        let mut sorted = entries;
        sorted.sort_by(|a, b| natord::compare(&a.name, &b.name));

        let mut table = entry_table(self, !args.no_styles);
        for entry in &sorted {
            table.add_row(entry);
        }
        table.write_stdio().map_err(|e| IndexError::Backing(e.into()))
    }
}

impl Cmd for LogCmd {
    fn exec(&self, service: &Service, _args: &IndexArgs, cancel: &CancelToken) -> Result<()> {
        let versions = service.list_versions(&self.object_id, cancel)?;

        let iter: Box<dyn Iterator<Item = &VersionSummary>> = if self.reverse {
            Box::new(versions.iter().rev())
        } else {
            Box::new(versions.iter())
        };

        for version in iter {
            println(FormatVersion { version, compact: self.compact })?;
        }

        Ok(())
    }
}

impl Cmd for ShowCmd {
    fn exec(&self, service: &Service, _args: &IndexArgs, cancel: &CancelToken) -> Result<()> {
        let v = self.version.unwrap_or(0);
        let summary = service.get_version_info(&self.object_id, v, cancel)?;

        if !self.minimal {
            println(FormatVersion { version: &summary, compact: false })?;
        }

        let to_v = summary.version_num.number;
        let from_v = to_v.saturating_sub(1);
        let changes = service.get_version_changes(&self.object_id, from_v, to_v as i64, cancel)?;
        print_diffs(&changes)
    }
}

impl Cmd for DiffCmd {
    fn exec(&self, service: &Service, _args: &IndexArgs, cancel: &CancelToken) -> Result<()> {
        if self.left as i64 == self.right {
            return Ok(());
        }
        let changes =
            service.get_version_changes(&self.object_id, self.left, self.right, cancel)?;
        print_diffs(&changes)
    }
}

impl Cmd for CatCmd {
    fn exec(&self, service: &Service, _args: &IndexArgs, cancel: &CancelToken) -> Result<()> {
        let version = self.version.unwrap_or(0);
        let (mut reader, _size) =
            service.open_version_file(&self.object_id, version, &self.path, cancel)?;
        io::copy(&mut reader, &mut io::stdout()).map_err(|e| IndexError::Backing(e.into()))?;
        Ok(())
    }
}

impl Cmd for SyncCmd {
    fn exec(&self, service: &Service, _args: &IndexArgs, cancel: &CancelToken) -> Result<()> {
        let brief = service.sync_object(&self.object_id, cancel)?;
        println!(
            "{:width$} {}\n{:width$} v{}\n{:width$} {}",
            "Object ID:",
            brief.object_id,
            "Head:",
            brief.head.number,
            "Indexed at:",
            brief.indexed_at,
            width = 12
        );
        Ok(())
    }
}

impl Cmd for IndexCmd {
    fn exec(&self, service: &Service, args: &IndexArgs, cancel: &CancelToken) -> Result<()> {
        let count = service.index_root(cancel)?;
        if !args.quiet {
            println!("Indexed {count} object(s)");
        }
        Ok(())
    }
}

fn entry_table<'a>(cmd: &ListCmd, enable_styling: bool) -> TableView<'a> {
    let mut columns = Vec::new();

    if cmd.long {
        columns.push(Column::new(ColumnId::Version, "Version", Alignment::Right));
        columns.push(Column::new(ColumnId::Created, "Modified", Alignment::Left));
        columns.push(Column::new(ColumnId::Size, "Size", Alignment::Right));
    }

    columns.push(Column::new(ColumnId::LogicalPath, "Name", Alignment::Left));

    if cmd.digest {
        columns.push(Column::new(ColumnId::Digest, "Digest", Alignment::Left));
    }

    TableView::new(columns, "  ", cmd.header, enable_styling)
}

impl<'a> AsRow<'a> for DirEntry {
    fn as_row(&'a self, columns: &[Column]) -> Row<'a> {
        let mut cells = Vec::new();

        for column in columns {
            let cell = match column.id {
                ColumnId::Version => TextCell::new_owned(&self.modifying_version.to_string()),
                ColumnId::Created => TextCell::new_owned(&self.modified.format(DATE_FORMAT).to_string()),
                ColumnId::Size => TextCell::new_owned(&if self.has_size {
                    self.size.to_string()
                } else {
                    "?".to_string()
                }),
                ColumnId::LogicalPath => {
                    let name = if self.is_directory {
                        format!("{}/", self.name)
                    } else {
                        self.name.clone()
                    };
                    TextCell::new_owned(&name)
                }
                ColumnId::Digest => TextCell::new_owned(self.digest.as_deref().unwrap_or("")),
                _ => TextCell::blank(),
            };
            cells.push(cell);
        }

        Row::new(cells)
    }
}

struct FormatVersion<'a> {
    version: &'a VersionSummary,
    compact: bool,
}

impl<'a> Display for FormatVersion<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = self.version.user_name.as_deref().unwrap_or("NA");
        let address = self.version.user_address.as_deref().unwrap_or("NA");
        let message = self.version.message.as_deref().unwrap_or("");

        if self.compact {
            write!(
                f,
                "{version:>5}\t{name}\t{address}\t{date:19}\t{message}",
                version = self.version.version_num.to_string(),
                date = self.version.created_at.format(DATE_FORMAT)
            )
        } else {
            write!(
                f,
                "{:width$} {}\n{:width$} {} <{}>\n{:width$} {}\n{:width$} {}\n",
                "Version:",
                self.version.version_num,
                "Author:",
                name,
                address,
                "Date:",
                self.version.created_at.to_rfc2822(),
                "Message:",
                message,
                width = 9
            )
        }
    }
}

fn print_diffs(changes: &[Diff]) -> Result<()> {
    for change in changes {
        let (status, path) = match change {
            Diff::Added(p) => ("A", p),
            Diff::Modified(p) => ("M", p),
            Diff::Deleted(p) => ("D", p),
        };
        println!("{status}\t{}", path.as_str());
    }
    Ok(())
}

fn println(value: impl Display) -> Result<()> {
    writeln!(io::stdout(), "{value}").map_err(|e| IndexError::Backing(e.into()))
}
