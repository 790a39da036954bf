//! Boosted cascade classifier compatible with OpenCV's cascade XML formats.
//!
//! Two layouts are understood: the `<cascade>` layout written by `opencv_traincascade`
//! (`BOOST` stages over `HAAR` or `LBP` features) and the older `opencv-haar-classifier`
//! layout of the stock `haarcascade_*.xml` files. Both load into the same stage/tree form.

mod features;
mod grouping;
mod integral;
mod legacy;
mod xml;

use std::{fs, path::Path};

use anyhow::{Context, Result, bail, ensure};
use image::{GrayImage, imageops::FilterType};
use log::{debug, trace};
use rayon::prelude::*;
use visage_utils::{config::DetectorSettings, timing_guard};

use crate::error::VisageError;
use crate::geometry::Rect;
use features::{FeatureSet, Window, parse_haar_features, parse_lbp_features, to_index};
pub use grouping::{GROUP_EPS, Group, group_rectangles};
pub use integral::IntegralImages;
use xml::XmlNode;

/// Offset subtracted from every stage threshold when a cascade is loaded.
const THRESHOLD_EPS: f64 = 1e-5;

/// Feature family of a loaded cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureType {
    Haar,
    Lbp,
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
    /// Category bitmask for LBP nodes: a set bit sends the code left.
    subset: [u32; 8],
}

#[derive(Debug, Clone, PartialEq)]
struct WeakTree {
    nodes: Vec<Node>,
    leaves: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
struct Stage {
    threshold: f64,
    trees: Vec<WeakTree>,
}

/// Multi-scale detection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeParams {
    /// Ratio between consecutive window sizes; must exceed 1.
    pub scale_factor: f64,
    /// Hits a cluster needs beyond one to be reported; zero disables grouping.
    pub min_neighbors: usize,
    /// Smallest window side in pixels, zero for no bound.
    pub min_size: u32,
    /// Largest window side in pixels, zero for the image size.
    pub max_size: u32,
    /// Return only the largest detection.
    pub find_biggest: bool,
    /// With `find_biggest`, stop at the largest scale that yields a detection.
    pub rough_search: bool,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 3,
            min_size: 0,
            max_size: 0,
            find_biggest: false,
            rough_search: false,
        }
    }
}

impl From<&DetectorSettings> for CascadeParams {
    fn from(settings: &DetectorSettings) -> Self {
        Self {
            scale_factor: settings.scale_factor,
            min_neighbors: settings.min_neighbors as usize,
            min_size: settings.min_size,
            max_size: settings.max_size,
            find_biggest: settings.find_biggest,
            rough_search: settings.rough_search,
        }
    }
}

/// One pyramid level of a multi-scale scan.
#[derive(Debug, Clone, Copy)]
struct Scale {
    factor: f64,
    window: (i32, i32),
    scaled: (u32, u32),
}

/// A trained cascade loaded from XML.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeClassifier {
    feature_type: FeatureType,
    window: (usize, usize),
    stages: Vec<Stage>,
    features: FeatureSet,
}

impl CascadeClassifier {
    /// Load a cascade from disk. Every failure is reported as [`VisageError::CascadeLoad`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let _guard = timing_guard("visage_core::cascade::load", log::Level::Debug);
        let text = fs::read_to_string(path).map_err(|e| VisageError::cascade_load(path, e))?;
        let cascade = Self::from_xml_str(&text).map_err(|e| VisageError::cascade_load(path, e))?;
        debug!(
            "loaded {:?} cascade {} ({}x{} window, {} stages, {} features)",
            cascade.feature_type,
            path.display(),
            cascade.window.0,
            cascade.window.1,
            cascade.stages.len(),
            cascade.features.len()
        );
        Ok(cascade)
    }

    /// Parse a cascade from XML text.
    pub fn from_xml_str(text: &str) -> Result<Self> {
        let root = xml::parse_document(text)?;
        ensure!(
            root.name == "opencv_storage",
            "expected <opencv_storage> root, found <{}>",
            root.name
        );
        if let Some(cascade) = root.child("cascade") {
            return Self::from_cascade_node(cascade);
        }
        match root.children.first() {
            Some(node) if node.child("size").is_some() && node.child("stages").is_some() => {
                legacy::parse_legacy(node)
            }
            Some(node) => bail!("<{}> is neither a <cascade> nor a Haar classifier", node.name),
            None => bail!("<opencv_storage> is empty"),
        }
    }

    fn from_cascade_node(cascade: &XmlNode) -> Result<Self> {
        let stage_type = cascade.require("stageType")?.text_trimmed();
        ensure!(stage_type == "BOOST", "unsupported stage type '{stage_type}'");

        let feature_type = match cascade.require("featureType")?.text_trimmed() {
            "HAAR" => FeatureType::Haar,
            "LBP" => FeatureType::Lbp,
            other => bail!("unsupported feature type '{other}'"),
        };

        let width: usize = cascade.require("width")?.parse_number()?;
        let height: usize = cascade.require("height")?.parse_number()?;
        ensure!(
            width >= 3 && height >= 3,
            "window {width}x{height} is too small"
        );

        let feature_nodes = cascade.require("features")?;
        let features = match feature_type {
            FeatureType::Haar => {
                FeatureSet::Haar(parse_haar_features(feature_nodes, width, height)?)
            }
            FeatureType::Lbp => FeatureSet::Lbp(parse_lbp_features(feature_nodes, width, height)?),
        };

        let stages = cascade
            .require("stages")?
            .items()
            .enumerate()
            .map(|(idx, stage)| {
                parse_stage(stage, feature_type, features.len())
                    .with_context(|| format!("stage {idx}"))
            })
            .collect::<Result<Vec<_>>>()?;
        ensure!(!stages.is_empty(), "cascade has no stages");

        Ok(Self {
            feature_type,
            window: (width, height),
            stages,
            features,
        })
    }

    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    /// Training window `(width, height)`.
    pub fn window_size(&self) -> (usize, usize) {
        self.window
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Evaluate the cascade on one window.
    ///
    /// Returns `1` when every stage accepts, otherwise `-s` where `s` is the rejecting stage
    /// (so `0` means the first stage rejected).
    pub fn run_at(&self, integral: &IntegralImages, x: usize, y: usize) -> i32 {
        let window = Window::new(integral, x, y, self.window.0, self.window.1);
        for (si, stage) in self.stages.iter().enumerate() {
            let sum: f64 = stage.trees.iter().map(|t| self.eval_tree(t, &window)).sum();
            if sum < stage.threshold {
                return -(si as i32);
            }
        }
        1
    }

    fn eval_tree(&self, tree: &WeakTree, window: &Window<'_>) -> f64 {
        let mut idx: i32 = 0;
        loop {
            let node = &tree.nodes[idx as usize];
            idx = match &self.features {
                FeatureSet::Haar(features) => {
                    if window.haar(&features[node.feature]) < node.threshold {
                        node.left
                    } else {
                        node.right
                    }
                }
                FeatureSet::Lbp(features) => {
                    let code = window.lbp(&features[node.feature]) as usize;
                    if node.subset[code >> 5] & (1 << (code & 31)) != 0 {
                        node.left
                    } else {
                        node.right
                    }
                }
            };
            if idx <= 0 {
                return tree.leaves[(-idx) as usize];
            }
        }
    }

    fn scales(&self, image_size: (u32, u32), params: &CascadeParams) -> Vec<Scale> {
        let (img_w, img_h) = image_size;
        let (win_w, win_h) = (self.window.0 as f64, self.window.1 as f64);
        let max_size = if params.max_size == 0 {
            (img_w as i32, img_h as i32)
        } else {
            (params.max_size as i32, params.max_size as i32)
        };
        let min_size = params.min_size as i32;

        let mut out = Vec::new();
        let mut factor = 1.0f64;
        loop {
            let window = (
                (win_w * factor).round_ties_even() as i32,
                (win_h * factor).round_ties_even() as i32,
            );
            if window.0 > max_size.0 || window.1 > max_size.1 {
                break;
            }
            let scaled = (
                (img_w as f64 / factor).round_ties_even() as i64,
                (img_h as f64 / factor).round_ties_even() as i64,
            );
            if scaled.0 < self.window.0 as i64 || scaled.1 < self.window.1 as i64 {
                break;
            }
            if window.0 >= min_size && window.1 >= min_size {
                out.push(Scale {
                    factor,
                    window,
                    scaled: (scaled.0 as u32, scaled.1 as u32),
                });
            }
            factor *= params.scale_factor;
        }
        out
    }

    /// Raw window hits at one pyramid level, in source image coordinates.
    fn scan_scale(&self, image: &GrayImage, scale: &Scale) -> Vec<Rect> {
        let resized;
        let level = if scale.scaled == image.dimensions() {
            image
        } else {
            resized = image::imageops::resize(
                image,
                scale.scaled.0,
                scale.scaled.1,
                FilterType::Triangle,
            );
            &resized
        };
        let integral = IntegralImages::new(level, self.features.uses_tilted());

        // Window origins run over `0..=scaled - window` on both axes.
        let cols = scale.scaled.0 as usize - self.window.0 + 1;
        let rows = scale.scaled.1 as usize - self.window.1 + 1;
        let step = if scale.factor > 2.0 { 1 } else { 2 };

        (0..rows.div_ceil(step))
            .into_par_iter()
            .flat_map_iter(|row_idx| {
                let y = row_idx * step;
                let mut hits = Vec::new();
                let mut x = 0;
                while x < cols {
                    let result = self.run_at(&integral, x, y);
                    if result > 0 {
                        hits.push(Rect::new(
                            (x as f64 * scale.factor).round_ties_even() as i32,
                            (y as f64 * scale.factor).round_ties_even() as i32,
                            scale.window.0,
                            scale.window.1,
                        ));
                    } else if result == 0 {
                        x += step;
                    }
                    x += step;
                }
                hits
            })
            .collect()
    }

    /// Detect objects at every scale and return the grouped rectangles.
    pub fn detect_multi_scale(
        &self,
        image: &GrayImage,
        params: &CascadeParams,
    ) -> Result<Vec<Rect>> {
        ensure!(
            params.scale_factor > 1.0 && params.scale_factor.is_finite(),
            "scale factor must be greater than 1, got {}",
            params.scale_factor
        );
        let _guard = timing_guard("visage_core::cascade::detect_multi_scale", log::Level::Debug);

        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let scales = self.scales(image.dimensions(), params);
        trace!("scanning {} pyramid levels", scales.len());

        if !params.find_biggest {
            let hits: Vec<Rect> = scales
                .iter()
                .flat_map(|s| self.scan_scale(image, s))
                .collect();
            return Ok(group_rectangles(&hits, params.min_neighbors, GROUP_EPS)
                .into_iter()
                .map(|g| g.rect)
                .collect());
        }

        let mut hits = Vec::new();
        for scale in scales.iter().rev() {
            let level_hits = self.scan_scale(image, scale);
            if params.rough_search {
                let groups = group_rectangles(&level_hits, params.min_neighbors, GROUP_EPS);
                if let Some(best) = biggest(groups.iter().map(|g| g.rect)) {
                    trace!("rough search stopped at window {:?}", scale.window);
                    return Ok(vec![best]);
                }
            }
            hits.extend(level_hits);
        }
        let groups = group_rectangles(&hits, params.min_neighbors, GROUP_EPS);
        Ok(biggest(groups.iter().map(|g| g.rect)).into_iter().collect())
    }
}

fn biggest(rects: impl Iterator<Item = Rect>) -> Option<Rect> {
    rects.fold(None, |best: Option<Rect>, r| match best {
        Some(b) if b.area() >= r.area() => Some(b),
        _ => Some(r),
    })
}

fn parse_stage(node: &XmlNode, feature_type: FeatureType, feature_count: usize) -> Result<Stage> {
    let threshold: f64 = node.require("stageThreshold")?.parse_number()?;
    let trees = node
        .require("weakClassifiers")?
        .items()
        .enumerate()
        .map(|(idx, weak)| {
            parse_tree(weak, feature_type, feature_count)
                .with_context(|| format!("weak classifier {idx}"))
        })
        .collect::<Result<Vec<_>>>()?;
    ensure!(!trees.is_empty(), "stage has no weak classifiers");
    Ok(Stage {
        threshold: threshold - THRESHOLD_EPS,
        trees,
    })
}

fn parse_tree(node: &XmlNode, feature_type: FeatureType, feature_count: usize) -> Result<WeakTree> {
    let values = node.require("internalNodes")?.parse_list()?;
    let leaves = node.require("leafValues")?.parse_list()?;
    let stride = match feature_type {
        FeatureType::Haar => 4,
        FeatureType::Lbp => 3 + 8,
    };
    ensure!(
        !values.is_empty() && values.len() % stride == 0,
        "internalNodes holds {} values, expected a multiple of {stride}",
        values.len()
    );

    let mut nodes = Vec::with_capacity(values.len() / stride);
    for chunk in values.chunks(stride) {
        let mut subset = [0u32; 8];
        let threshold = match feature_type {
            FeatureType::Haar => chunk[3],
            FeatureType::Lbp => {
                for (slot, v) in subset.iter_mut().zip(&chunk[3..]) {
                    *slot = *v as i64 as i32 as u32;
                }
                0.0
            }
        };
        let feature = to_index(chunk[2], "feature index")?;
        ensure!(
            feature < feature_count,
            "feature index {feature} out of range ({feature_count} features)"
        );
        nodes.push(Node {
            left: child_ref(chunk[0])?,
            right: child_ref(chunk[1])?,
            feature,
            threshold,
            subset,
        });
    }

    // Children always follow their parent, which also rules out cycles.
    for (idx, node) in nodes.iter().enumerate() {
        for child in [node.left, node.right] {
            let ok = if child > 0 {
                (child as usize) > idx && (child as usize) < nodes.len()
            } else {
                child
                    .checked_neg()
                    .is_some_and(|leaf| (leaf as usize) < leaves.len())
            };
            ensure!(ok, "child reference {child} is out of range");
        }
    }
    Ok(WeakTree { nodes, leaves })
}

/// Node reference from `internalNodes`: positive for an inner node, `-leaf` for a leaf.
fn child_ref(value: f64) -> Result<i32> {
    ensure!(
        value.fract() == 0.0 && value.abs() <= i32::MAX as f64,
        "child reference {value} is not a node or leaf index"
    );
    Ok(value as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use visage_utils::fixture_path;

    fn fixture_cascade() -> CascadeClassifier {
        let path = fixture_path("cascades/center_box_haar.xml").expect("fixture");
        CascadeClassifier::load(path).expect("load cascade")
    }

    fn dark_with_square(w: u32, h: u32, sq: Rect) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let inside = (x as i32) >= sq.x
                && (x as i32) < sq.right()
                && (y as i32) >= sq.y
                && (y as i32) < sq.bottom();
            Luma([if inside { 220 } else { 30 }])
        })
    }

    const LBP_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>LBP</featureType>
  <height>6</height>
  <width>6</width>
  <stages>
    <_>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 -1 -1 -1 -1 -1 -1 -1 -1</internalNodes>
          <leafValues>
            1. -1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rect>
        0 0 2 2</rect></_></features></cascade>
</opencv_storage>
"#;

    #[test]
    fn loads_fixture_structure() {
        let cascade = fixture_cascade();
        assert_eq!(cascade.feature_type(), FeatureType::Haar);
        assert_eq!(cascade.window_size(), (24, 24));
        assert_eq!(cascade.stage_count(), 2);
        assert!(cascade.features.uses_tilted());
    }

    #[test]
    fn missing_file_is_cascade_load_error() {
        let err = CascadeClassifier::load("no/such/cascade.xml").expect_err("missing");
        assert!(matches!(
            err.downcast_ref::<VisageError>(),
            Some(VisageError::CascadeLoad { .. })
        ));
    }

    #[test]
    fn legacy_layout_matches_current_layout() {
        let current = fixture_cascade();
        let path = fixture_path("cascades/center_box_legacy.xml").expect("fixture");
        let legacy = CascadeClassifier::load(path).expect("load legacy cascade");
        assert_eq!(legacy.feature_type(), FeatureType::Haar);
        assert_eq!(legacy.window_size(), (24, 24));
        assert_eq!(legacy.stage_count(), 2);
        assert!(legacy.features.uses_tilted());

        let image = dark_with_square(48, 48, Rect::new(18, 18, 12, 12));
        let integral = IntegralImages::new(&image, true);
        for y in 0..=24 {
            for x in 0..=24 {
                assert_eq!(
                    legacy.run_at(&integral, x, y),
                    current.run_at(&integral, x, y),
                    "window at ({x}, {y})"
                );
            }
        }

        let image = dark_with_square(64, 64, Rect::new(26, 26, 12, 12));
        let params = CascadeParams {
            min_neighbors: 0,
            max_size: 30,
            ..CascadeParams::default()
        };
        assert_eq!(
            legacy.detect_multi_scale(&image, &params).expect("legacy detect"),
            current.detect_multi_scale(&image, &params).expect("detect")
        );
    }

    #[test]
    fn unknown_root_child_is_rejected() {
        let text = "<opencv_storage><svm><size>20 20</size></svm></opencv_storage>";
        let err = CascadeClassifier::from_xml_str(text).expect_err("not a cascade");
        assert!(err.to_string().contains("<svm>"), "{err}");
    }

    #[test]
    fn malformed_child_references_are_rejected() {
        for nodes in ["0 -2147483648 0 1.", "0.5 -1 0 1.", "0 -1e12 0 1.", "0 -3 0 1."] {
            let internal = format!("{nodes} -1 -1 -1 -1 -1 -1 -1");
            let text = LBP_CASCADE.replace("0 -1 0 -1 -1 -1 -1 -1 -1 -1 -1", &internal);
            assert!(CascadeClassifier::from_xml_str(&text).is_err(), "{nodes}");
        }
    }

    #[test]
    fn unsupported_feature_type_is_rejected() {
        let text = LBP_CASCADE.replace("<featureType>LBP", "<featureType>HOG");
        assert!(CascadeClassifier::from_xml_str(&text).is_err());
    }

    #[test]
    fn out_of_range_feature_index_is_rejected() {
        let text = LBP_CASCADE.replace("0 -1 0 -1", "0 -1 5 -1");
        assert!(CascadeClassifier::from_xml_str(&text).is_err());
    }

    #[test]
    fn run_at_accepts_centered_square_only() {
        let cascade = fixture_cascade();
        let image = dark_with_square(48, 48, Rect::new(18, 18, 12, 12));
        let integral = IntegralImages::new(&image, true);
        assert_eq!(cascade.run_at(&integral, 12, 12), 1);
        // Flat corner window: rejected by the first stage.
        assert_eq!(cascade.run_at(&integral, 0, 0), 0);
    }

    #[test]
    fn lbp_all_bits_set_takes_left_leaf() {
        let cascade = CascadeClassifier::from_xml_str(LBP_CASCADE).expect("lbp cascade");
        assert_eq!(cascade.feature_type(), FeatureType::Lbp);
        let image = GrayImage::from_pixel(6, 6, Luma([40]));
        let integral = IntegralImages::new(&image, false);
        // Every code has its bit set, so the left leaf (+1) always wins.
        assert_eq!(cascade.run_at(&integral, 0, 0), 1);
    }

    #[test]
    fn detects_square_at_native_scale() {
        let cascade = fixture_cascade();
        let image = dark_with_square(64, 64, Rect::new(26, 26, 12, 12));
        let params = CascadeParams {
            min_neighbors: 0,
            max_size: 30,
            ..CascadeParams::default()
        };
        let found = cascade.detect_multi_scale(&image, &params).expect("detect");
        assert!(found.contains(&Rect::new(20, 20, 24, 24)), "{found:?}");
    }

    #[test]
    fn window_sized_image_is_scanned() {
        let cascade = fixture_cascade();
        let image = dark_with_square(24, 24, Rect::new(6, 6, 12, 12));
        let integral = IntegralImages::new(&image, true);
        assert_eq!(cascade.run_at(&integral, 0, 0), 1);
        let params = CascadeParams {
            min_neighbors: 0,
            ..CascadeParams::default()
        };
        let found = cascade.detect_multi_scale(&image, &params).expect("detect");
        assert_eq!(found, vec![Rect::new(0, 0, 24, 24)]);
    }

    #[test]
    fn last_window_column_and_row_are_scanned() {
        let cascade = fixture_cascade();
        // Only the window at the bottom-right origin (2, 2) is centred on the square.
        let image = dark_with_square(26, 26, Rect::new(8, 8, 12, 12));
        let params = CascadeParams {
            min_neighbors: 0,
            max_size: 24,
            ..CascadeParams::default()
        };
        let found = cascade.detect_multi_scale(&image, &params).expect("detect");
        assert!(found.contains(&Rect::new(2, 2, 24, 24)), "{found:?}");
    }

    #[test]
    fn biggest_rough_search_finds_large_square() {
        let cascade = fixture_cascade();
        let image = dark_with_square(320, 240, Rect::new(110, 70, 100, 100));
        let params = CascadeParams {
            scale_factor: 1.1,
            min_neighbors: 1,
            min_size: 100,
            max_size: 0,
            find_biggest: true,
            rough_search: true,
        };
        let found = cascade.detect_multi_scale(&image, &params).expect("detect");
        assert_eq!(found.len(), 1, "{found:?}");
        let face = found[0];
        let (cx, cy) = (face.x + face.width / 2, face.y + face.height / 2);
        assert!((cx - 160).abs() <= 12 && (cy - 120).abs() <= 12, "{face:?}");
        assert!(face.width >= 150 && face.width <= 260, "{face:?}");
    }

    #[test]
    fn blank_image_yields_nothing() {
        let cascade = fixture_cascade();
        let image = GrayImage::from_pixel(200, 200, Luma([30]));
        let found = cascade
            .detect_multi_scale(&image, &CascadeParams::default())
            .expect("detect");
        assert!(found.is_empty());
    }

    #[test]
    fn rejects_scale_factor_of_one() {
        let cascade = fixture_cascade();
        let image = GrayImage::new(50, 50);
        let params = CascadeParams {
            scale_factor: 1.0,
            ..CascadeParams::default()
        };
        assert!(cascade.detect_multi_scale(&image, &params).is_err());
    }
}
