use crate::{
    foundation::error::{PaintError, PaintResult},
    stroke::model::StrokeSet,
};

/// Independently tunable partition of a [`StrokeSet`]'s parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamGroup {
    /// Control point coordinates.
    Points,
    /// RGBA colors.
    Color,
    /// Stroke widths.
    Width,
}

impl ParamGroup {
    /// Every group, in update order.
    pub const ALL: [ParamGroup; 3] = [ParamGroup::Points, ParamGroup::Color, ParamGroup::Width];

    pub fn name(self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Color => "color",
            Self::Width => "width",
        }
    }
}

impl std::fmt::Display for ParamGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Gradients with the same shape as a [`StrokeSet`]'s parameter tensors.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeGrads {
    pub points: Vec<f64>,
    pub colors: Vec<f64>,
    pub widths: Vec<f64>,
}

impl StrokeGrads {
    /// All-zero gradients shaped like `strokes`.
    pub fn zeros_like(strokes: &StrokeSet) -> Self {
        Self {
            points: vec![0.0; strokes.tensor(ParamGroup::Points).len()],
            colors: vec![0.0; strokes.tensor(ParamGroup::Color).len()],
            widths: vec![0.0; strokes.tensor(ParamGroup::Width).len()],
        }
    }

    pub fn tensor(&self, group: ParamGroup) -> &[f64] {
        match group {
            ParamGroup::Points => &self.points,
            ParamGroup::Color => &self.colors,
            ParamGroup::Width => &self.widths,
        }
    }

    pub fn tensor_mut(&mut self, group: ParamGroup) -> &mut [f64] {
        match group {
            ParamGroup::Points => &mut self.points,
            ParamGroup::Color => &mut self.colors,
            ParamGroup::Width => &mut self.widths,
        }
    }

    /// Check every tensor matches the shape of `strokes`.
    pub fn check_shape(&self, strokes: &StrokeSet) -> PaintResult<()> {
        for group in ParamGroup::ALL {
            let want = strokes.tensor(group).len();
            let got = self.tensor(group).len();
            if want != got {
                return Err(PaintError::optimizer(format!(
                    "{group} gradient has {got} entries, parameters have {want}"
                )));
            }
        }
        Ok(())
    }

    /// Element-wise `self += other * scale`.
    pub fn add_scaled(&mut self, other: &StrokeGrads, scale: f64) {
        for group in ParamGroup::ALL {
            for (a, b) in self.tensor_mut(group).iter_mut().zip(other.tensor(group)) {
                *a += b * scale;
            }
        }
    }

    pub fn is_finite(&self) -> bool {
        self.points
            .iter()
            .chain(&self.colors)
            .chain(&self.widths)
            .all(|v| v.is_finite())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stroke/params.rs"]
mod tests;
