use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use crate::{
    foundation::error::PaintResult,
    loss::composer::{LossBreakdown, Stage},
    render::raster::Raster,
    render::svg::{SvgOptions, write_svg},
    stroke::model::StrokeSet,
    stroke::params::ParamGroup,
};

/// Summary of one finished iteration.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct IterationReport {
    pub stage: Stage,
    pub iteration: u64,
    pub total: f64,
    pub breakdown: LossBreakdown,
    /// Learning rate each group stepped with.
    pub lrs: [(ParamGroup, f64); 3],
}

/// Hooks the session calls between iterations.
///
/// Observers run on the session thread; a slow observer slows the session.
pub trait SessionObserver {
    /// Return [`ControlFlow::Break`] to stop the session after this iteration.
    fn on_iteration(&mut self, _report: &IterationReport) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Called every `save_step` iterations and once at each stage end.
    fn on_snapshot(
        &mut self,
        _stage: Stage,
        _iteration: u64,
        _raster: &Raster,
        _strokes: &StrokeSet,
    ) -> PaintResult<()> {
        Ok(())
    }

    fn on_stage_end(&mut self, _stage: Stage, _strokes: &StrokeSet) -> PaintResult<()> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Writes `{dir}/{stage}/iter{n}.png` and `.svg` for every snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotWriter {
    dir: PathBuf,
    svg: SvgOptions,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>, svg: SvgOptions) -> Self {
        Self {
            dir: dir.into(),
            svg,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self, stage: Stage, iteration: u64, ext: &str) -> PathBuf {
        self.dir
            .join(stage.name())
            .join(format!("iter{iteration}.{ext}"))
    }
}

impl SessionObserver for SnapshotWriter {
    fn on_snapshot(
        &mut self,
        stage: Stage,
        iteration: u64,
        raster: &Raster,
        strokes: &StrokeSet,
    ) -> PaintResult<()> {
        raster.save_png(&self.snapshot_path(stage, iteration, "png"))?;
        write_svg(&self.snapshot_path(stage, iteration, "svg"), strokes, self.svg)?;
        tracing::debug!(%stage, iteration, dir = %self.dir.display(), "snapshot written");
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/observer.rs"]
mod tests;
