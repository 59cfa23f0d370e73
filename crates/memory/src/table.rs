use bucketlog_api::{
    Authorizations, Cell, DynCellCombiner, DynScanTransform, Mutation,
    RowRange, StoreError, StoreResult, Timestamp,
};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tokio::sync::RwLock;

/// The full cell key. The BTreeMap ordering over this tuple is the
/// engine's native sort: ascending `(row, family, qualifier)`.
type CellKey = (String, String, String, String);

#[derive(Debug, Clone)]
struct StoredValue {
    timestamp: Timestamp,
    value: bytes::Bytes,
}

#[derive(Debug)]
struct CombinerReg {
    name: String,
    priority: u32,
    families: Vec<String>,
    combiner: DynCellCombiner,
}

/// One in-memory table: sorted cells plus the pushdown registry.
#[derive(Debug, Default)]
pub(crate) struct TableState {
    cells: RwLock<BTreeMap<CellKey, StoredValue>>,
    transforms: RwLock<HashMap<String, (u32, DynScanTransform)>>,
    combiners: RwLock<Vec<CombinerReg>>,
}

impl TableState {
    /// Registrations are keyed by name; re-registering a name replaces
    /// the previous registration, so initializing a store twice against
    /// the same table is benign.
    pub(crate) async fn register_scan_transform(
        &self,
        name: String,
        priority: u32,
        transform: DynScanTransform,
    ) -> StoreResult<()> {
        self.transforms
            .write()
            .await
            .insert(name, (priority, transform));
        Ok(())
    }

    pub(crate) async fn register_combiner(
        &self,
        name: String,
        priority: u32,
        families: Vec<String>,
        combiner: DynCellCombiner,
    ) -> StoreResult<()> {
        let mut combiners = self.combiners.write().await;
        combiners.retain(|c| c.name != name);
        combiners.push(CombinerReg {
            name,
            priority,
            families,
            combiner,
        });
        combiners.sort_by_key(|c| c.priority);
        Ok(())
    }

    /// Fold buffered mutations into the table.
    ///
    /// This is the compaction-time half of the combiner contract: when a
    /// put lands on a key that already holds a value and a combiner is
    /// registered for the column family, the stored value becomes the
    /// combination of the two. Without a combiner the put overwrites.
    pub(crate) async fn fold_in(
        &self,
        mutations: Vec<Mutation>,
    ) -> StoreResult<()> {
        let combiners = self.combiners.read().await;
        let mut cells = self.cells.write().await;

        for mutation in mutations {
            for put in mutation.puts {
                let key = (
                    mutation.row.clone(),
                    put.family.clone(),
                    put.qualifier,
                    put.visibility,
                );
                let combiner = combiners
                    .iter()
                    .find(|c| c.families.iter().any(|f| *f == put.family));
                let value = match (combiner, cells.get(&key)) {
                    (Some(reg), Some(existing)) => reg.combiner.combine(
                        vec![existing.value.clone(), put.value],
                    )?,
                    _ => put.value,
                };
                cells.insert(
                    key,
                    StoredValue {
                        timestamp: put.timestamp,
                        value,
                    },
                );
            }
        }

        Ok(())
    }

    /// Forward scan over `[range.start, range.end]` in native sort order,
    /// filtered by the authorization predicate, with the named scan
    /// transform applied per row before returning.
    pub(crate) async fn scan(
        &self,
        range: RowRange,
        auths: Authorizations,
        transform: Option<&str>,
    ) -> StoreResult<Vec<Cell>> {
        let raw: Vec<Cell> = {
            let cells = self.cells.read().await;
            let from = (
                range.start.clone(),
                String::new(),
                String::new(),
                String::new(),
            );
            cells
                .range((Bound::Included(from), Bound::Unbounded))
                .take_while(|((row, _, _, _), _)| *row <= range.end)
                .filter(|((_, _, _, visibility), _)| {
                    auths.can_see(visibility)
                })
                .map(|((row, family, qualifier, visibility), stored)| Cell {
                    row: row.clone(),
                    family: family.clone(),
                    qualifier: qualifier.clone(),
                    visibility: visibility.clone(),
                    timestamp: stored.timestamp,
                    value: stored.value.clone(),
                })
                .collect()
        };

        let Some(name) = transform else {
            return Ok(raw);
        };

        let transforms = self.transforms.read().await;
        let Some((_, transform)) = transforms.get(name) else {
            return Err(StoreError::configuration(format!(
                "no scan transform registered under '{name}'"
            )));
        };

        // Transforms consume whole rows, so feed them one row at a time in
        // scan order.
        let mut out = Vec::new();
        let mut row_cells: Vec<Cell> = Vec::new();
        for cell in raw {
            if let Some(prev) = row_cells.last() {
                if prev.row != cell.row {
                    let row = row_cells[0].row.clone();
                    out.extend(
                        transform
                            .apply(&row, std::mem::take(&mut row_cells))?,
                    );
                }
            }
            row_cells.push(cell);
        }
        if let Some(first) = row_cells.first() {
            let row = first.row.clone();
            out.extend(transform.apply(&row, row_cells)?);
        }

        Ok(out)
    }
}
