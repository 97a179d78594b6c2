//! Capture and report of uncollectable reference cycles.
//!
//! [`GarbageBrowser::new`] switches the collector into save-all mode, runs a
//! full collection and builds an [`ObjectGraph`] over everything the
//! collector retained. Typical use on the global collector:
//!
//! ```no_run
//! use garbage_browser::{GarbageBrowser, end_debug_garbage, start_debug_garbage};
//!
//! start_debug_garbage()?;
//! // ... drop the last external references to the suspected cycle ...
//! let browser = GarbageBrowser::from_global(true)?;
//! end_debug_garbage();
//!
//! browser.print_stats_stdout()?;
//! browser.render(std::path::Path::new("garbage.dot"))?;
//! # Ok::<(), garbage_browser::GCError>(())
//! ```

use crate::GCResult;
use crate::error::GCError;
use crate::gc::{DEBUG_SAVEALL, global};
use crate::graph::{ObjectGraph, ObjectMetadata};
use crate::object::ObjectId;
use crate::runtime::{CycleCollector, ObjectInspector};
use crate::table::{Column, Table, pp};
use log::info;
use std::io::{self, Write};
use std::path::Path;

const COLUMNS: [Column; 4] = [
    Column::left("id", 10),
    Column::right("size", 8),
    Column::left("type", 12).truncated(12),
    Column::left("representation", 46).truncated(46),
];

pub const STATS_TABLE: Table<'static> = Table::new(&COLUMNS);

#[derive(Debug, Clone)]
pub struct GarbageBrowser {
    garbage: Vec<ObjectId>,
    graph: ObjectGraph,
}

impl GarbageBrowser {
    /// Captures the collector's current garbage. Fails with
    /// [`GCError::CollectorStateConflict`] while save-all mode is already on;
    /// end the previous session first.
    pub fn new<R>(runtime: &mut R, reduce: bool) -> GCResult<Self>
    where
        R: CycleCollector + ObjectInspector + ?Sized,
    {
        let flags = runtime.get_debug();
        if flags & DEBUG_SAVEALL != 0 {
            return Err(GCError::CollectorStateConflict);
        }

        runtime.set_debug(flags | DEBUG_SAVEALL);
        if let Err(err) = runtime.collect() {
            runtime.set_debug(flags);
            return Err(err);
        }

        let garbage = runtime.garbage();
        let graph = ObjectGraph::build(&*runtime, &garbage, reduce);
        info!(
            "captured {} garbage objects, {} in cycles",
            graph.count(),
            graph.count_in_cycles()
        );

        Ok(Self { garbage, graph })
    }

    pub fn from_global(reduce: bool) -> GCResult<Self> {
        let gc = global::get_gc();
        let mut gc = gc.write();
        Self::new(&mut *gc, reduce)
    }

    /// Every object retained by the capture, before any reduction.
    pub fn garbage(&self) -> &[ObjectId] {
        &self.garbage
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn metadata(&self) -> &[ObjectMetadata] {
        self.graph.metadata()
    }

    pub fn count(&self) -> usize {
        self.graph.count()
    }

    pub fn count_in_cycles(&self) -> usize {
        self.graph.count_in_cycles()
    }

    pub fn total_size(&self) -> usize {
        self.graph.total_size()
    }

    /// Metadata ordered by size, largest first; equal sizes keep their
    /// capture order.
    pub fn sorted_metadata(&self) -> Vec<&ObjectMetadata> {
        let mut rows: Vec<&ObjectMetadata> = self.graph.metadata().iter().collect();
        rows.sort_by(|a, b| b.size.cmp(&a.size));
        rows
    }

    pub fn print_stats<W: Write + ?Sized>(&self, out: &mut W) -> GCResult<()> {
        STATS_TABLE.write_header(out)?;
        for md in self.sorted_metadata() {
            STATS_TABLE.write_row(
                out,
                &[
                    md.id.to_string(),
                    md.size.to_string(),
                    md.type_name.clone(),
                    md.repr.clone(),
                ],
            )?;
        }

        let summary = format!(
            "Garbage: {:8} collected objects ({:6} in cycles): {:>12}\n",
            self.count(),
            self.count_in_cycles(),
            pp(self.total_size())
        );
        out.write_all(summary.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    pub fn print_stats_stdout(&self) -> GCResult<()> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.print_stats(&mut lock)
    }

    pub fn render(&self, path: &Path) -> GCResult<bool> {
        self.graph.render(path)
    }
}
