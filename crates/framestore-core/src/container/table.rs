//! Appendable table nodes.
//!
//! A table is a fixed row layout (ordered fields, each with a
//! [`ColumnType`]) plus an ordered list of parquet segments, one per
//! appended chunk. The manifest describing layout, segments, row count and
//! secondary indexes lives in the node record and is rewritten atomically on
//! [`TableNode::flush`].
//!
//! Secondary indexes keep per-segment min/max statistics for one field;
//! filtered reads skip segments whose statistics prove a condition false.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, new_empty_array};
use arrow::compute::kernels::interleave::interleave;
use arrow::compute::{concat, concat_batches, filter_record_batch};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use log::debug;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt};

use super::atom::ColumnType;
use super::condition::Condition;
use super::error::{
    ArrowSnafu, ContainerResult, LayoutMismatchSnafu, ReadOnlySnafu, RowOutOfRangeSnafu,
    UnknownFieldSnafu,
};
use super::filters::{Filters, writer_properties};
use super::path::NodePath;
use super::record::{NODE_RECORD_VERSION, NodeKind, NodeRecord};
use super::segment::{read_batch, write_batch};
use super::stats::{ColumnStats, IntervalTruth};
use super::fs;
use crate::config::IndexKind;

/// One field of a table's row layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableField {
    /// Field name.
    pub name: String,
    /// On-disk type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl TableField {
    /// Build a field.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Settings of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index kind.
    pub kind: IndexKind,
    /// Optimization level.
    pub optlevel: u8,
}

/// One parquet segment of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// File name inside the table directory.
    pub file: String,
    /// Row count.
    pub rows: u64,
    /// Statistics for indexed fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stats: BTreeMap<String, ColumnStats>,
}

/// Persisted layout and contents of a table node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableManifest {
    /// Row layout in field order.
    pub fields: Vec<TableField>,
    /// Expected final row count supplied at creation.
    pub expectedrows: u64,
    /// Current row count.
    pub nrows: u64,
    /// Segments in row order.
    #[serde(default)]
    pub segments: Vec<SegmentMeta>,
    /// Secondary indexes by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indexes: BTreeMap<String, IndexSpec>,
    /// Counter used to name new segment files.
    #[serde(default)]
    pub next_segment: u64,
    /// Compression applied to segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
}

/// Open handle on a table node.
#[derive(Debug)]
pub struct TableNode {
    path: NodePath,
    dir: PathBuf,
    record: NodeRecord,
    manifest: TableManifest,
    schema: SchemaRef,
    writable: bool,
    dirty: bool,
    pending_removals: Vec<PathBuf>,
}

fn arrow_schema(fields: &[TableField]) -> SchemaRef {
    Arc::new(Schema::new(
        fields
            .iter()
            .map(|f| Field::new(&f.name, f.column_type.arrow_type(), true))
            .collect::<Vec<_>>(),
    ))
}

impl TableNode {
    pub(crate) fn create(
        dir: PathBuf,
        path: NodePath,
        fields: Vec<TableField>,
        expectedrows: u64,
        filters: Option<Filters>,
    ) -> ContainerResult<Self> {
        fs::create_dir_all(&dir)?;
        let manifest = TableManifest {
            fields,
            expectedrows,
            nrows: 0,
            segments: Vec::new(),
            indexes: BTreeMap::new(),
            next_segment: 0,
            filters,
        };
        let record = NodeRecord {
            version: NODE_RECORD_VERSION,
            kind: NodeKind::Table,
            attrs: serde_json::Value::Null,
            array: None,
            table: None,
        };
        let mut node = Self::from_parts(dir, path, record, manifest, true);
        node.dirty = true;
        node.flush()?;
        Ok(node)
    }

    pub(crate) fn open(
        dir: PathBuf,
        path: NodePath,
        mut record: NodeRecord,
        writable: bool,
    ) -> ContainerResult<Self> {
        record.expect_kind(&path.to_string(), NodeKind::Table)?;
        let manifest = record.table.take().context(LayoutMismatchSnafu {
            path: path.to_string(),
            reason: "table node has no manifest",
        })?;
        Ok(Self::from_parts(dir, path, record, manifest, writable))
    }

    fn from_parts(
        dir: PathBuf,
        path: NodePath,
        record: NodeRecord,
        manifest: TableManifest,
        writable: bool,
    ) -> Self {
        let schema = arrow_schema(&manifest.fields);
        Self {
            path,
            dir,
            record,
            manifest,
            schema,
            writable,
            dirty: false,
            pending_removals: Vec::new(),
        }
    }

    /// Node path of the table.
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Row layout.
    pub fn fields(&self) -> &[TableField] {
        &self.manifest.fields
    }

    /// Position and definition of a field.
    pub fn field(&self, name: &str) -> Option<(usize, &TableField)> {
        self.manifest
            .fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
    }

    /// Arrow schema of stored records.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Current row count.
    pub fn nrows(&self) -> u64 {
        self.manifest.nrows
    }

    /// Expected-rows hint given at creation.
    pub fn expectedrows(&self) -> u64 {
        self.manifest.expectedrows
    }

    /// Compression applied to new segments.
    pub fn filters(&self) -> Option<&Filters> {
        self.manifest.filters.as_ref()
    }

    /// Number of stored segments.
    pub fn segment_count(&self) -> usize {
        self.manifest.segments.len()
    }

    /// Decode the table node's own attributes.
    pub fn attrs<T: DeserializeOwned>(&self) -> ContainerResult<Option<T>> {
        self.record.decode_attrs(&self.path.to_string())
    }

    /// Replace the table node's attributes and persist them.
    pub fn set_attrs<T: Serialize>(&mut self, attrs: &T) -> ContainerResult<()> {
        self.ensure_writable()?;
        self.record.encode_attrs(&self.path.to_string(), attrs)?;
        self.dirty = true;
        self.flush()
    }

    /// Settings of the index on `field`, if one exists.
    pub fn index(&self, field: &str) -> Option<&IndexSpec> {
        self.manifest.indexes.get(field)
    }

    fn ensure_writable(&self) -> ContainerResult<()> {
        if !self.writable {
            return ReadOnlySnafu {
                path: self.path.to_string(),
            }
            .fail();
        }
        Ok(())
    }

    fn segment_path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn new_segment_file(&mut self) -> String {
        let id = self.manifest.next_segment;
        self.manifest.next_segment += 1;
        format!("_seg-{id:08}.parquet")
    }

    fn index_stats(&self, batch: &RecordBatch) -> BTreeMap<String, ColumnStats> {
        let mut stats = BTreeMap::new();
        for field in self.manifest.indexes.keys() {
            if let Some(column) = batch.column_by_name(field) {
                if let Some(s) = ColumnStats::compute(column) {
                    stats.insert(field.clone(), s);
                }
            }
        }
        stats
    }

    fn write_segment(&mut self, batch: &RecordBatch) -> ContainerResult<SegmentMeta> {
        let file = self.new_segment_file();
        let props = writer_properties(self.manifest.filters.as_ref())?;
        write_batch(&self.segment_path(&file), batch, props)?;
        Ok(SegmentMeta {
            file,
            rows: batch.num_rows() as u64,
            stats: self.index_stats(batch),
        })
    }

    fn check_layout(&self, batch: &RecordBatch) -> ContainerResult<()> {
        let fields = batch.schema();
        let mismatch = |reason: String| {
            LayoutMismatchSnafu {
                path: self.path.to_string(),
                reason,
            }
            .fail()
        };
        if fields.fields().len() != self.manifest.fields.len() {
            return mismatch(format!(
                "expected {} fields, got {}",
                self.manifest.fields.len(),
                fields.fields().len()
            ));
        }
        for (got, want) in fields.fields().iter().zip(self.schema.fields()) {
            if got.name() != want.name() || got.data_type() != want.data_type() {
                return mismatch(format!(
                    "field {} ({}) does not match {} ({})",
                    got.name(),
                    got.data_type(),
                    want.name(),
                    want.data_type()
                ));
            }
        }
        Ok(())
    }

    /// Append records conforming to the row layout as a new segment.
    pub fn append(&mut self, batch: &RecordBatch) -> ContainerResult<()> {
        self.ensure_writable()?;
        self.check_layout(batch)?;
        if batch.num_rows() == 0 {
            return Ok(());
        }
        let batch = RecordBatch::try_new(self.schema.clone(), batch.columns().to_vec())
            .context(ArrowSnafu)?;
        let segment = self.write_segment(&batch)?;
        debug!(
            "appended {} rows to {} as {}",
            segment.rows, self.path, segment.file
        );
        self.manifest.nrows += segment.rows;
        self.manifest.segments.push(segment);
        self.dirty = true;
        Ok(())
    }

    /// Persist the manifest if it changed and drop replaced segment files.
    pub fn flush(&mut self) -> ContainerResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut record = self.record.clone();
        record.table = Some(self.manifest.clone());
        record.store(&self.dir)?;
        for file in self.pending_removals.drain(..) {
            fs::remove_file_if_exists(&file)?;
        }
        self.dirty = false;
        Ok(())
    }

    /// Segments overlapping `[start, stop)` as `(segment, offset, lo, hi)`
    /// where `lo..hi` is the local row range.
    fn overlapping(&self, start: u64, stop: u64) -> Vec<(usize, u64, u64, u64)> {
        let mut out = Vec::new();
        let mut offset = 0u64;
        for (i, seg) in self.manifest.segments.iter().enumerate() {
            let seg_start = offset;
            let seg_end = offset + seg.rows;
            offset = seg_end;
            if seg_end <= start || seg_start >= stop {
                continue;
            }
            let lo = start.max(seg_start) - seg_start;
            let hi = stop.min(seg_end) - seg_start;
            out.push((i, seg_start, lo, hi));
        }
        out
    }

    fn read_segment(&self, index: usize, projection: Option<&[usize]>) -> ContainerResult<RecordBatch> {
        let seg = &self.manifest.segments[index];
        read_batch(&self.segment_path(&seg.file), Some(&self.schema), projection)
    }

    /// Remove rows `[start, stop)`, returning the number removed.
    ///
    /// Only segments touching the range are rewritten. Call [`flush`] to
    /// persist the change.
    ///
    /// [`flush`]: TableNode::flush
    pub fn remove_rows(&mut self, start: u64, stop: u64) -> ContainerResult<u64> {
        self.ensure_writable()?;
        let stop = stop.min(self.manifest.nrows);
        if start >= stop {
            return Ok(0);
        }

        let touched = self.overlapping(start, stop);
        let mut replacements: BTreeMap<usize, Option<SegmentMeta>> = BTreeMap::new();
        for (i, _, lo, hi) in touched {
            let rows = self.manifest.segments[i].rows;
            let old = self.segment_path(&self.manifest.segments[i].file);
            self.pending_removals.push(old);
            if lo == 0 && hi == rows {
                replacements.insert(i, None);
                continue;
            }
            let batch = self.read_segment(i, None)?;
            let head = batch.slice(0, lo as usize);
            let tail = batch.slice(hi as usize, (rows - hi) as usize);
            let kept = concat_batches(&self.schema, [&head, &tail]).context(ArrowSnafu)?;
            let segment = self.write_segment(&kept)?;
            debug!(
                "rewrote segment {} of {} keeping {} rows",
                self.manifest.segments[i].file, self.path, segment.rows
            );
            replacements.insert(i, Some(segment));
        }

        let segments = std::mem::take(&mut self.manifest.segments);
        self.manifest.segments = segments
            .into_iter()
            .enumerate()
            .filter_map(|(i, seg)| match replacements.remove(&i) {
                Some(replacement) => replacement,
                None => Some(seg),
            })
            .collect();
        let removed = stop - start;
        self.manifest.nrows -= removed;
        self.dirty = true;
        Ok(removed)
    }

    /// Read rows `[start, stop)`.
    pub fn read(&self, start: u64, stop: u64) -> ContainerResult<RecordBatch> {
        let mut parts = Vec::new();
        for (i, _, lo, hi) in self.overlapping(start, stop) {
            let batch = self.read_segment(i, None)?;
            parts.push(batch.slice(lo as usize, (hi - lo) as usize));
        }
        concat_batches(&self.schema, &parts).context(ArrowSnafu)
    }

    fn check_condition(&self, condition: &Condition) -> ContainerResult<()> {
        for field in condition.fields() {
            if self.field(field).is_none() {
                return UnknownFieldSnafu {
                    path: self.path.to_string(),
                    field,
                }
                .fail();
            }
        }
        Ok(())
    }

    /// Visit every candidate slice in `[start, stop)` with its absolute
    /// offset and condition mask, skipping segments the statistics rule out.
    fn scan_where(
        &self,
        condition: &Condition,
        start: u64,
        stop: u64,
        mut visit: impl FnMut(u64, &RecordBatch, &arrow::array::BooleanArray) -> ContainerResult<()>,
    ) -> ContainerResult<()> {
        self.check_condition(condition)?;
        let table = self.path.to_string();
        for (i, offset, lo, hi) in self.overlapping(start, stop) {
            let seg = &self.manifest.segments[i];
            let stats = |field: &str| seg.stats.get(field);
            if condition.truth(&stats) == IntervalTruth::AlwaysFalse {
                debug!("skipped segment {} of {} by index statistics", seg.file, self.path);
                continue;
            }
            let batch = self.read_segment(i, None)?;
            let slice = batch.slice(lo as usize, (hi - lo) as usize);
            let mask = condition.evaluate(&table, &slice)?;
            visit(offset + lo, &slice, &mask)?;
        }
        Ok(())
    }

    /// Read the rows in `[start, stop)` satisfying `condition`.
    pub fn read_where(&self, condition: &Condition, start: u64, stop: u64) -> ContainerResult<RecordBatch> {
        let mut parts = Vec::new();
        self.scan_where(condition, start, stop, |_, slice, mask| {
            parts.push(filter_record_batch(slice, mask).context(ArrowSnafu)?);
            Ok(())
        })?;
        concat_batches(&self.schema, &parts).context(ArrowSnafu)
    }

    /// Ascending coordinates of the rows in `[start, stop)` satisfying `condition`.
    pub fn get_where_list(&self, condition: &Condition, start: u64, stop: u64) -> ContainerResult<Vec<u64>> {
        let mut out = Vec::new();
        self.scan_where(condition, start, stop, |first, _, mask| {
            out.extend(
                mask.values()
                    .iter()
                    .enumerate()
                    .filter(|(_, keep)| *keep)
                    .map(|(j, _)| first + j as u64),
            );
            Ok(())
        })?;
        Ok(out)
    }

    /// Read rows at explicit coordinates, in the order given.
    pub fn read_coordinates(&self, coords: &[u64]) -> ContainerResult<RecordBatch> {
        if coords.is_empty() {
            return Ok(RecordBatch::new_empty(self.schema.clone()));
        }
        let nrows = self.manifest.nrows;
        let mut ends = Vec::with_capacity(self.manifest.segments.len());
        let mut acc = 0u64;
        for seg in &self.manifest.segments {
            acc += seg.rows;
            ends.push(acc);
        }

        let mut loaded: BTreeMap<usize, usize> = BTreeMap::new();
        let mut batches = Vec::new();
        let mut picks = Vec::with_capacity(coords.len());
        for &row in coords {
            if row >= nrows {
                return RowOutOfRangeSnafu {
                    path: self.path.to_string(),
                    row,
                    nrows,
                }
                .fail();
            }
            let seg = ends.partition_point(|end| *end <= row);
            let seg_start = if seg == 0 { 0 } else { ends[seg - 1] };
            let slot = match loaded.get(&seg) {
                Some(slot) => *slot,
                None => {
                    batches.push(self.read_segment(seg, None)?);
                    loaded.insert(seg, batches.len() - 1);
                    batches.len() - 1
                }
            };
            picks.push((slot, (row - seg_start) as usize));
        }

        let mut columns = Vec::with_capacity(self.schema.fields().len());
        for c in 0..self.schema.fields().len() {
            let arrays: Vec<&dyn Array> = batches.iter().map(|b| b.column(c).as_ref()).collect();
            columns.push(interleave(&arrays, &picks).context(ArrowSnafu)?);
        }
        RecordBatch::try_new(self.schema.clone(), columns).context(ArrowSnafu)
    }

    /// Read one field over rows `[start, stop)`.
    pub fn read_column(&self, field: &str, start: u64, stop: u64) -> ContainerResult<ArrayRef> {
        let (pos, def) = self.field(field).context(UnknownFieldSnafu {
            path: self.path.to_string(),
            field,
        })?;
        let data_type = def.column_type.arrow_type();
        let mut parts: Vec<ArrayRef> = Vec::new();
        for (i, _, lo, hi) in self.overlapping(start, stop) {
            let batch = self.read_segment(i, Some([pos].as_slice()))?;
            parts.push(batch.column(0).slice(lo as usize, (hi - lo) as usize));
        }
        if parts.is_empty() {
            return Ok(new_empty_array(&data_type));
        }
        let refs: Vec<&dyn Array> = parts.iter().map(|a| a.as_ref()).collect();
        concat(&refs).context(ArrowSnafu)
    }

    /// Build (or rebuild) the secondary index on `field`.
    pub fn create_index(&mut self, field: &str, spec: IndexSpec) -> ContainerResult<()> {
        self.ensure_writable()?;
        let (pos, _) = self.field(field).context(UnknownFieldSnafu {
            path: self.path.to_string(),
            field,
        })?;
        for i in 0..self.manifest.segments.len() {
            let batch = self.read_segment(i, Some([pos].as_slice()))?;
            let seg = &mut self.manifest.segments[i];
            match ColumnStats::compute(batch.column(0)) {
                Some(s) => {
                    seg.stats.insert(field.to_string(), s);
                }
                None => {
                    seg.stats.remove(field);
                }
            }
        }
        self.manifest.indexes.insert(field.to_string(), spec);
        debug!("indexed field {field} of {} ({:?})", self.path, spec);
        self.dirty = true;
        self.flush()
    }

    /// Drop the secondary index on `field`, if any.
    pub fn remove_index(&mut self, field: &str) -> ContainerResult<()> {
        self.ensure_writable()?;
        if self.manifest.indexes.remove(field).is_none() {
            return Ok(());
        }
        for seg in &mut self.manifest.segments {
            seg.stats.remove(field);
        }
        self.dirty = true;
        self.flush()
    }
}
