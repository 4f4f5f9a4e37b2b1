//! Extraction of the client-facing portrait from a synthesized image.

use ndarray::{s, Array3, ArrayView3, Axis};
use ndarray_stats::QuantileExt;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::geom::{Model, AXIS_NAMES};
use crate::protocol::{JobId, ResultMessage};
use crate::vector::{norm_sqr, reject, CVector3};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModelBuilder;
    use crate::geom::PortraitAxes;
    use crate::vector::Vec3;
    use num_complex::Complex64;

    fn model(axes: PortraitAxes, rx: i64) -> Model {
        ModelBuilder::new()
            .coordinates(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
            .visibility(vec![true])
            .direction(Vec3::new(0.0, 0.0, -1.0))
            .band(5)
            .polarization(0, rx)
            .axes(axes)
            .build()
            .unwrap()
    }

    fn filled(shape: (usize, usize, usize)) -> Array3<CVector3> {
        Array3::from_shape_fn(shape, |(i, j, k)| {
            CVector3::new(
                Complex64::new((i + j + k) as f64, 0.0),
                Complex64::new(0.0, 1.0),
                Complex64::new(0.0, 0.0),
            )
        })
    }

    #[test]
    fn crop_window_is_centred_and_clamped() {
        // l_max = sqrt(2), Ka cross step 0.125 -> 12 cells + 2 * 2 margin
        assert_eq!(crop_window(64, Some(0.125), 2.0f64.sqrt(), 2), (24, 16));
        assert_eq!(crop_window(8, Some(0.125), 2.0f64.sqrt(), 2), (0, 8));
        assert_eq!(crop_window(1, None, 2.0f64.sqrt(), 2), (0, 1));
        assert_eq!(crop_window(8, Some(0.125), 1e30, usize::MAX), (0, 8));
    }

    #[test]
    fn two_dimensional_extraction() {
        let axes = PortraitAxes {
            azimuth: true,
            range: true,
            elevation: false,
        };
        let model = model(axes, 0);
        let portrait = Portrait::extract(&filled((64, 32, 1)).view(), &model, 2);
        assert_eq!(portrait.dimension_type, 1);
        let NestedArray::D2(rows) = &portrait.abs else {
            panic!("expected 2D data");
        };
        assert_eq!(rows.len(), 16);
        assert_eq!(rows[0].len(), 10);
        assert_eq!(portrait.abs_info.shape, vec![16, 10]);
        assert_eq!(portrait.abs_info.axes, vec!["azimuth", "range"]);
        assert_eq!(portrait.abs_info.steps, vec![0.125, 0.25]);

        // first kept cell is (24, 11, 0): |E|^2 = 35^2 + 1
        let first = 35.0f64 * 35.0 + 1.0;
        let NestedArray::D2(norms) = &portrait.norm else {
            panic!("expected 2D data");
        };
        assert!((norms[0][0] - first).abs() < 1e-9);
        assert!((rows[0][0] - first.sqrt()).abs() < 1e-9);
        assert!(portrait.norm_info.min <= portrait.norm_info.max);
    }

    #[test]
    fn cross_polarization_removes_receive_component() {
        let axes = PortraitAxes {
            azimuth: false,
            range: true,
            elevation: false,
        };
        let model = model(axes, 1);
        assert!(model.wave.is_cross_polarized());
        let erx = model.wave.erx;
        let image = Array3::from_elem(
            (1, 8, 1),
            CVector3::new(
                Complex64::new(erx.x, 0.0),
                Complex64::new(erx.y, 0.0),
                Complex64::new(erx.z, 0.0),
            ),
        );
        let portrait = Portrait::extract(&image.view(), &model, 2);
        assert_eq!(portrait.dimension_type, 0);
        let NestedArray::D1(values) = &portrait.abs else {
            panic!("expected 1D data");
        };
        assert_eq!(values.len(), 8);
        assert!(values.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn single_cell_is_degenerate() {
        let axes = PortraitAxes {
            azimuth: true,
            range: false,
            elevation: false,
        };
        let model = model(axes, 0);
        let portrait = Portrait::extract(&filled((1, 1, 1)).view(), &model, 2);
        assert_eq!(portrait.dimension_type, -1);
        assert_eq!(portrait.abs, NestedArray::D1(vec![1.0]));
    }

    #[test]
    fn nested_arrays_serialize_as_plain_lists() {
        let nested = NestedArray::D2(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let json = serde_json::to_string(&nested).unwrap();
        assert_eq!(json, "[[1.0,2.0],[3.0,4.0]]");
        let back: NestedArray = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NestedArray::D2(vec![vec![1.0, 2.0], vec![3.0, 4.0]]));
    }
}

/// Numeric payload shaped by the number of image axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NestedArray {
    D1(Vec<f64>),
    D2(Vec<Vec<f64>>),
    D3(Vec<Vec<Vec<f64>>>),
}

/// Summary of one payload array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortraitInfo {
    pub min: f64,
    pub max: f64,
    pub shape: Vec<usize>,
    pub axes: Vec<String>,
    pub steps: Vec<f64>,
}

/// Cropped magnitude images of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Portrait {
    /// Number of multi-cell axes minus one, or -1 when every axis is a single cell.
    pub dimension_type: i32,
    /// `|E|` per cell.
    pub abs: NestedArray,
    /// `|E|^2` per cell.
    pub norm: NestedArray,
    pub abs_info: PortraitInfo,
    pub norm_info: PortraitInfo,
}

/// Start and length of the kept window on an axis of `len` cells.
pub fn crop_window(len: usize, step: Option<f64>, l_max: f64, margin: usize) -> (usize, usize) {
    let Some(step) = step.filter(|_| len > 1) else {
        return (0, len);
    };
    let extent = ((l_max / step).ceil() as usize).saturating_add(margin.saturating_mul(2));
    let keep = extent.clamp(1, len);
    ((len - keep) / 2, keep)
}

impl Portrait {
    pub fn extract(image: &ArrayView3<CVector3>, model: &Model, margin: usize) -> Self {
        let dims = image.shape();
        let windows: Vec<(usize, usize)> = (0..3)
            .map(|axis| crop_window(dims[axis], model.steps[axis], model.l_max, margin))
            .collect();
        let cropped = image.slice(s![
            windows[0].0..windows[0].0 + windows[0].1,
            windows[1].0..windows[1].0 + windows[1].1,
            windows[2].0..windows[2].0 + windows[2].1,
        ]);

        let cross = model.wave.is_cross_polarized();
        let erx = model.wave.erx;
        let norm: Array3<f64> = cropped.map(|field| {
            if cross {
                norm_sqr(&reject(field, &erx))
            } else {
                norm_sqr(field)
            }
        });
        let abs = norm.mapv(f64::sqrt);

        let kept: Vec<usize> = (0..3).filter(|&axis| norm.len_of(Axis(axis)) > 1).collect();
        let dimension_type = kept.len() as i32 - 1;
        let shape = kept.iter().map(|&a| norm.len_of(Axis(a))).collect::<Vec<_>>();
        let axes = kept.iter().map(|&a| AXIS_NAMES[a].to_string()).collect::<Vec<_>>();
        let steps = kept
            .iter()
            .map(|&a| model.steps[a].unwrap_or(model.wave.steps[a]))
            .collect::<Vec<_>>();

        let info = |values: &Array3<f64>| PortraitInfo {
            min: values.min_skipnan().to_owned(),
            max: values.max_skipnan().to_owned(),
            shape: shape.clone(),
            axes: axes.clone(),
            steps: steps.clone(),
        };

        Self {
            dimension_type,
            abs_info: info(&abs),
            norm_info: info(&norm),
            abs: nest(&abs, &kept),
            norm: nest(&norm, &kept),
        }
    }

    pub fn into_message(self, id: JobId) -> ResultMessage {
        ResultMessage {
            id,
            content: config::RESULT_CONTENT.to_string(),
            dimension_type: self.dimension_type,
            abs_eout: self.abs,
            norm_eout: self.norm,
            info_abs_eout: self.abs_info,
            info_norm_eout: self.norm_info,
        }
    }
}

/// Drops the single-cell axes and nests the rest in x, y, z order.
fn nest(values: &Array3<f64>, kept: &[usize]) -> NestedArray {
    let dropped: Vec<usize> = (0..3).filter(|a| !kept.contains(a)).collect();
    let mut view = values.view().into_dyn();
    // highest axis first so the remaining indices stay valid
    for &axis in dropped.iter().rev() {
        view = view.index_axis_move(Axis(axis), 0);
    }
    match view.ndim() {
        0 | 1 => NestedArray::D1(view.iter().copied().collect()),
        2 => NestedArray::D2(
            view.outer_iter()
                .map(|row| row.iter().copied().collect())
                .collect(),
        ),
        _ => NestedArray::D3(
            view.outer_iter()
                .map(|plane| {
                    plane
                        .outer_iter()
                        .map(|row| row.iter().copied().collect())
                        .collect()
                })
                .collect(),
        ),
    }
}
