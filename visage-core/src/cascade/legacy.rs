//! Reader for the `opencv-haar-classifier` layout used by the stock `haarcascade_*.xml` files.
//!
//! Each tree node carries its own feature; nodes point at later nodes through `left_node` /
//! `right_node` or end in `left_val` / `right_val` leaves.

use anyhow::{Context, Result, ensure};

use super::features::{FeatureSet, HaarFeature, parse_haar_feature, to_index};
use super::xml::XmlNode;
use super::{CascadeClassifier, FeatureType, Node, Stage, WeakTree};

/// Offset subtracted from every stage threshold of this layout.
const STAGE_THRESHOLD_EPS: f64 = 1e-4;

pub(super) fn parse_legacy(root: &XmlNode) -> Result<CascadeClassifier> {
    let size = root.require("size")?.parse_list()?;
    ensure!(
        size.len() == 2,
        "<size> needs 'width height', got {} values",
        size.len()
    );
    let width = to_index(size[0], "window width")?;
    let height = to_index(size[1], "window height")?;
    ensure!(
        width >= 3 && height >= 3,
        "window {width}x{height} is too small"
    );

    let mut features = Vec::new();
    let mut stages = Vec::new();
    for (idx, stage) in root.require("stages")?.items().enumerate() {
        let stage = parse_stage(stage, idx, (width, height), &mut features)
            .with_context(|| format!("stage {idx}"))?;
        stages.push(stage);
    }
    ensure!(!stages.is_empty(), "cascade has no stages");

    Ok(CascadeClassifier {
        feature_type: FeatureType::Haar,
        window: (width, height),
        stages,
        features: FeatureSet::Haar(features),
    })
}

fn parse_stage(
    node: &XmlNode,
    idx: usize,
    window: (usize, usize),
    features: &mut Vec<HaarFeature>,
) -> Result<Stage> {
    if let Some(parent) = node.child("parent") {
        let parent: i64 = parent.parse_number()?;
        ensure!(
            parent == idx as i64 - 1,
            "parent {parent} breaks the stage chain; tree-shaped cascades are not supported"
        );
    }
    if let Some(next) = node.child("next") {
        let next: i64 = next.parse_number()?;
        ensure!(next == -1, "next {next} is not supported");
    }

    let threshold: f64 = node.require("stage_threshold")?.parse_number()?;
    let mut trees = Vec::new();
    for (tree_idx, tree) in node.require("trees")?.items().enumerate() {
        let tree = parse_tree(tree, window, features)
            .with_context(|| format!("tree {tree_idx}"))?;
        trees.push(tree);
    }
    ensure!(!trees.is_empty(), "stage has no trees");
    Ok(Stage {
        threshold: threshold - STAGE_THRESHOLD_EPS,
        trees,
    })
}

fn parse_tree(
    tree: &XmlNode,
    window: (usize, usize),
    features: &mut Vec<HaarFeature>,
) -> Result<WeakTree> {
    let items: Vec<&XmlNode> = tree.items().collect();
    ensure!(!items.is_empty(), "tree has no nodes");

    let mut nodes = Vec::with_capacity(items.len());
    let mut leaves = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        let mut feature = parse_haar_feature(item.require("feature")?, window.0, window.1)
            .with_context(|| format!("node {idx}"))?;
        feature.scale_legacy_weights();
        let threshold: f64 = item.require("threshold")?.parse_number()?;
        let left = branch(item, "left", idx, items.len(), &mut leaves)?;
        let right = branch(item, "right", idx, items.len(), &mut leaves)?;

        features.push(feature);
        nodes.push(Node {
            left,
            right,
            feature: features.len() - 1,
            threshold,
            subset: [0; 8],
        });
    }
    Ok(WeakTree { nodes, leaves })
}

/// One side of a node: a later node of the same tree, or a new leaf encoded as `-leaf`.
fn branch(
    item: &XmlNode,
    side: &str,
    idx: usize,
    node_count: usize,
    leaves: &mut Vec<f64>,
) -> Result<i32> {
    if let Some(value) = item.child(&format!("{side}_val")) {
        leaves.push(value.parse_number()?);
        let leaf = i32::try_from(leaves.len() - 1).context("too many leaves")?;
        return Ok(-leaf);
    }
    let child: usize = item
        .child(&format!("{side}_node"))
        .with_context(|| format!("node {idx} has neither {side}_val nor {side}_node"))?
        .parse_number()?;
    ensure!(
        child > idx && child < node_count,
        "node {idx}: {side}_node {child} is out of range"
    );
    i32::try_from(child).context("node index out of range")
}
