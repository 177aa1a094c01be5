//! Incremental rendering of the history list.
//!
//! The renderer keeps its own model of the rows on screen and turns each new
//! history snapshot into a [`RenderPlan`]: removals, keyed moves and inserts
//! from [`parkdash_core::reconcile`], then status cell patches. A row whose
//! record is processing owns a [`ProgressElement`] that survives every pass
//! until the record settles, so animations driven through
//! [`ReconciliationRenderer::animate_progress`] are never reset by a render.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parkdash_config::{CREEP_DURATION_MS, CREEP_FRACTION};
use parkdash_core::reconcile::{diff_order, OrderOp};
use parkdash_core::{Filters, ProcessStatus, RecordKey, TxRecord};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::ports::RenderSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    EaseOut,
    /// Fast start that flattens out, used for the creep toward completion.
    Creep,
}

impl Easing {
    pub fn css(self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::EaseOut => "ease-out",
            Easing::Creep => "cubic-bezier(0, 0, 0, 1)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressStyle {
    pub percent: f64,
    pub duration: Duration,
    pub easing: Easing,
}

impl ProgressStyle {
    pub fn percent_label(&self) -> u8 {
        self.percent.clamp(0.0, 100.0).floor() as u8
    }
}

/// Live progress bar of a processing row.
#[derive(Debug)]
pub struct ProgressElement {
    key: RecordKey,
    style: Mutex<ProgressStyle>,
    attached: AtomicBool,
}

impl ProgressElement {
    fn new(key: RecordKey, percent: f64) -> Self {
        Self {
            key,
            style: Mutex::new(ProgressStyle {
                percent,
                duration: Duration::ZERO,
                easing: Easing::Linear,
            }),
            attached: AtomicBool::new(true),
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn style(&self) -> ProgressStyle {
        *self.style.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `false` once the row was removed or its status cell replaced.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    fn set_style(&self, style: ProgressStyle) {
        *self.style.lock().unwrap_or_else(|e| e.into_inner()) = style;
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub enum StatusCell {
    Label(ProcessStatus),
    Progress(Arc<ProgressElement>),
}

impl StatusCell {
    fn build(record: &TxRecord) -> Self {
        if record.status == ProcessStatus::Processing {
            let percent = f64::from(record.progress.unwrap_or(0));
            StatusCell::Progress(Arc::new(ProgressElement::new(record.id.clone(), percent)))
        } else {
            StatusCell::Label(record.status)
        }
    }

    pub fn progress(&self) -> Option<&Arc<ProgressElement>> {
        match self {
            StatusCell::Progress(el) => Some(el),
            StatusCell::Label(_) => None,
        }
    }

    fn detach(&self) {
        if let StatusCell::Progress(el) = self {
            el.detach();
        }
    }
}

/// One row as rendered. Everything but the status cell is fixed at creation.
#[derive(Debug, Clone)]
pub struct RenderedRow {
    pub record: TxRecord,
    pub status: StatusCell,
}

impl RenderedRow {
    fn new(record: &TxRecord) -> Self {
        Self {
            record: record.clone(),
            status: StatusCell::build(record),
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.record.id
    }
}

#[derive(Debug, Clone)]
pub enum RenderOp {
    ShowEmpty,
    HideEmpty,
    Remove {
        key: RecordKey,
    },
    Insert {
        row: RenderedRow,
        before: Option<RecordKey>,
    },
    Move {
        key: RecordKey,
        before: Option<RecordKey>,
    },
    PatchStatus {
        key: RecordKey,
        cell: StatusCell,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RenderPlan {
    pub ops: Vec<RenderOp>,
}

impl RenderPlan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn count(&self, f: impl Fn(&RenderOp) -> bool) -> usize {
        self.ops.iter().filter(|op| f(op)).count()
    }

    pub fn moves(&self) -> usize {
        self.count(|op| matches!(op, RenderOp::Move { .. }))
    }

    pub fn inserts(&self) -> usize {
        self.count(|op| matches!(op, RenderOp::Insert { .. }))
    }

    pub fn removes(&self) -> usize {
        self.count(|op| matches!(op, RenderOp::Remove { .. }))
    }

    pub fn patches(&self) -> usize {
        self.count(|op| matches!(op, RenderOp::PatchStatus { .. }))
    }
}

#[derive(Default)]
struct Screen {
    rows: Vec<RenderedRow>,
    empty_shown: bool,
}

type TimerMap = HashMap<RecordKey, (u64, CancellationToken)>;
type Timers = Arc<Mutex<TimerMap>>;

pub struct ReconciliationRenderer {
    screen: Mutex<Screen>,
    timers: Timers,
    generation: AtomicU64,
    surface: Arc<dyn RenderSurface>,
}

impl std::fmt::Debug for ReconciliationRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationRenderer")
            .field("rows", &self.row_keys())
            .finish()
    }
}

impl ReconciliationRenderer {
    pub fn new(surface: Arc<dyn RenderSurface>) -> Self {
        Self {
            screen: Mutex::new(Screen::default()),
            timers: Arc::default(),
            generation: AtomicU64::new(0),
            surface,
        }
    }

    /// Brings the rows in line with `history` narrowed by `filters` and hands
    /// the resulting plan to the surface.
    pub fn render(&self, history: &[TxRecord], filters: &Filters) -> RenderPlan {
        let plan = {
            let mut screen = self.lock_screen();
            Self::reconcile(&mut screen, history, filters)
        };
        if !plan.is_empty() {
            self.surface.apply_history(&plan);
        }
        plan
    }

    fn reconcile(screen: &mut Screen, history: &[TxRecord], filters: &Filters) -> RenderPlan {
        let desired: Vec<&TxRecord> = history
            .iter()
            .filter(|r| filters.matches_record(r))
            .collect();
        let mut ops = Vec::new();

        if desired.is_empty() {
            for row in screen.rows.drain(..) {
                row.status.detach();
                ops.push(RenderOp::Remove {
                    key: row.record.id,
                });
            }
            if !screen.empty_shown {
                screen.empty_shown = true;
                ops.push(RenderOp::ShowEmpty);
            }
            return RenderPlan { ops };
        }

        if screen.empty_shown {
            screen.empty_shown = false;
            ops.push(RenderOp::HideEmpty);
        }

        let current: Vec<RecordKey> = screen.rows.iter().map(|r| r.key().clone()).collect();
        let wanted: Vec<RecordKey> = desired.iter().map(|r| r.id.clone()).collect();
        let order = diff_order(&current, &wanted);
        let by_key: HashMap<&str, &TxRecord> =
            desired.iter().map(|r| (r.id.as_str(), *r)).collect();

        let mut existing: HashMap<RecordKey, RenderedRow> = screen
            .rows
            .drain(..)
            .map(|row| (row.key().clone(), row))
            .collect();

        for key in &order.removes {
            if let Some(row) = existing.remove(key) {
                row.status.detach();
            }
            ops.push(RenderOp::Remove { key: key.clone() });
        }

        let mut created: HashMap<RecordKey, RenderedRow> = HashMap::new();
        for op in &order.ops {
            match op {
                OrderOp::Insert { key, before } => {
                    let Some(record) = by_key.get(key.as_str()) else {
                        continue;
                    };
                    let row = RenderedRow::new(record);
                    created.insert(key.clone(), row.clone());
                    ops.push(RenderOp::Insert {
                        row,
                        before: before.clone(),
                    });
                }
                OrderOp::Move { key, before } => ops.push(RenderOp::Move {
                    key: key.clone(),
                    before: before.clone(),
                }),
            }
        }

        for record in &desired {
            if let Some(mut row) = existing.remove(&record.id) {
                if let Some(cell) = Self::patch_status(&row.status, record) {
                    row.status.detach();
                    row.status = cell.clone();
                    ops.push(RenderOp::PatchStatus {
                        key: record.id.clone(),
                        cell,
                    });
                }
                screen.rows.push(row);
            } else if let Some(row) = created.remove(&record.id) {
                screen.rows.push(row);
            }
        }

        RenderPlan { ops }
    }

    /// New status cell for a retained row, `None` when it stays as is.
    fn patch_status(cell: &StatusCell, record: &TxRecord) -> Option<StatusCell> {
        match (cell, record.status) {
            (StatusCell::Progress(_), ProcessStatus::Processing) => None,
            (StatusCell::Label(_), ProcessStatus::Processing) => Some(StatusCell::build(record)),
            (StatusCell::Progress(_), status) => Some(StatusCell::Label(status)),
            (StatusCell::Label(current), status) if *current != status => {
                Some(StatusCell::Label(status))
            }
            (StatusCell::Label(_), _) => None,
        }
    }

    pub fn row_keys(&self) -> Vec<RecordKey> {
        self.lock_screen()
            .rows
            .iter()
            .map(|r| r.key().clone())
            .collect()
    }

    pub fn rows(&self) -> Vec<RenderedRow> {
        self.lock_screen().rows.clone()
    }

    pub fn is_empty_shown(&self) -> bool {
        self.lock_screen().empty_shown
    }

    pub fn progress_element(&self, key: &str) -> Option<Arc<ProgressElement>> {
        self.lock_screen()
            .rows
            .iter()
            .find(|r| r.key() == key)
            .and_then(|r| r.status.progress().cloned())
    }

    /// Moves the progress bar of `key` to `target` over `duration`.
    ///
    /// Below 100 the bar then keeps creeping toward completion until the next
    /// call for the same key replaces the follow-up. The returned future
    /// resolves once the catch-up is done; the animation itself proceeds
    /// whether or not it is awaited. Without a progress element it resolves
    /// immediately.
    pub fn animate_progress(
        &self,
        key: &str,
        target: f64,
        duration: Duration,
    ) -> BoxFuture<'static, ()> {
        let Some(element) = self.progress_element(key) else {
            return futures::future::ready(()).boxed();
        };
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(key, "progress animation needs a runtime");
            return futures::future::ready(()).boxed();
        };

        if let Some((_, token)) = self.lock_timers().remove(key) {
            token.cancel();
        }

        let style = ProgressStyle {
            percent: target,
            duration,
            easing: Easing::EaseOut,
        };
        element.set_style(style);
        self.surface.progress(element.key(), &style);

        if target >= 100.0 {
            return tokio::time::sleep(duration).boxed();
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.lock_timers()
            .insert(key.to_string(), (generation, token.clone()));

        let (done_tx, done_rx) = oneshot::channel();
        let timers = self.timers.clone();
        let surface = self.surface.clone();
        rt.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    if element.is_attached() {
                        let creep = ProgressStyle {
                            percent: target + (100.0 - target) * CREEP_FRACTION,
                            duration: Duration::from_millis(CREEP_DURATION_MS),
                            easing: Easing::Creep,
                        };
                        element.set_style(creep);
                        surface.progress(element.key(), &creep);
                    }
                    let mut timers = timers.lock().unwrap_or_else(|e| e.into_inner());
                    if timers.get(element.key()).is_some_and(|(g, _)| *g == generation) {
                        timers.remove(element.key());
                    }
                }
            }
            let _ = done_tx.send(());
        });

        async move {
            let _ = done_rx.await;
        }
        .boxed()
    }

    fn lock_screen(&self) -> std::sync::MutexGuard<'_, Screen> {
        self.screen.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_timers(&self) -> std::sync::MutexGuard<'_, TimerMap> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
