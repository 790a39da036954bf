//! Clustering of raw window hits into final detections.

use crate::geometry::Rect;

/// Relative tolerance used when deciding that two hits describe the same object.
pub const GROUP_EPS: f64 = 0.2;

fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    (a.x - b.x).abs() as f64 <= delta
        && (a.y - b.y).abs() as f64 <= delta
        && (a.right() - b.right()).abs() as f64 <= delta
        && (a.bottom() - b.bottom()).abs() as f64 <= delta
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Assign each rectangle a class id so that similar rectangles share a class.
///
/// Class ids are numbered in order of their first member.
fn partition(rects: &[Rect], eps: f64) -> (Vec<usize>, usize) {
    let mut parent: Vec<usize> = (0..rects.len()).collect();
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj.max(ri)] = ri.min(rj);
                }
            }
        }
    }

    let mut class_of_root = vec![usize::MAX; rects.len()];
    let mut labels = Vec::with_capacity(rects.len());
    let mut classes = 0;
    for i in 0..rects.len() {
        let root = find(&mut parent, i);
        if class_of_root[root] == usize::MAX {
            class_of_root[root] = classes;
            classes += 1;
        }
        labels.push(class_of_root[root]);
    }
    (labels, classes)
}

/// A grouped detection with the number of raw hits it absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    pub rect: Rect,
    pub hits: usize,
}

/// Merge overlapping hits.
///
/// Hits are clustered, each cluster is averaged, clusters with at most `min_neighbors` hits are
/// dropped, and so are clusters sitting inside a clearly stronger one. With
/// `min_neighbors == 0` every hit is returned as its own group.
pub fn group_rectangles(rects: &[Rect], min_neighbors: usize, eps: f64) -> Vec<Group> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.iter().map(|&rect| Group { rect, hits: 1 }).collect();
    }

    let (labels, classes) = partition(rects, eps);
    let mut sums = vec![(0i64, 0i64, 0i64, 0i64); classes];
    let mut counts = vec![0usize; classes];
    for (rect, &label) in rects.iter().zip(&labels) {
        let s = &mut sums[label];
        s.0 += rect.x as i64;
        s.1 += rect.y as i64;
        s.2 += rect.width as i64;
        s.3 += rect.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<Rect> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &n)| {
            let n = n as f64;
            Rect::new(
                (s.0 as f64 / n).round_ties_even() as i32,
                (s.1 as f64 / n).round_ties_even() as i32,
                (s.2 as f64 / n).round_ties_even() as i32,
                (s.3 as f64 / n).round_ties_even() as i32,
            )
        })
        .collect();

    let mut out = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }
        let swallowed = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round_ties_even() as i32;
            let dy = (r2.height as f64 * eps).round_ties_even() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !swallowed {
            out.push(Group { rect: *r1, hits: n1 });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_neighbors_keeps_raw_hits() {
        let rects = vec![Rect::new(0, 0, 10, 10), Rect::new(1, 1, 10, 10)];
        let groups = group_rectangles(&rects, 0, GROUP_EPS);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.hits == 1));
    }

    #[test]
    fn clusters_are_averaged_and_thresholded() {
        let rects = vec![
            Rect::new(100, 100, 50, 50),
            Rect::new(102, 98, 50, 50),
            Rect::new(98, 102, 52, 50),
            // Lone hit far away.
            Rect::new(400, 400, 50, 50),
        ];
        let groups = group_rectangles(&rects, 1, GROUP_EPS);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].hits, 3);
        assert_eq!(groups[0].rect, Rect::new(100, 100, 51, 50));
    }

    #[test]
    fn cluster_average_rounds_half_to_even() {
        let rects = vec![Rect::new(0, 0, 10, 10), Rect::new(1, 1, 11, 11)];
        let groups = group_rectangles(&rects, 1, GROUP_EPS);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].rect, Rect::new(0, 0, 10, 10));
    }

    #[test]
    fn weak_cluster_inside_strong_one_is_dropped() {
        let mut rects = vec![Rect::new(0, 0, 100, 100); 5];
        rects.extend([Rect::new(30, 30, 40, 40), Rect::new(31, 31, 40, 40)]);
        let groups = group_rectangles(&rects, 1, GROUP_EPS);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].rect, Rect::new(0, 0, 100, 100));
    }

    #[test]
    fn transitive_similarity_forms_one_class() {
        let rects = vec![
            Rect::new(0, 0, 20, 20),
            Rect::new(4, 0, 20, 20),
            Rect::new(8, 0, 20, 20),
        ];
        let (labels, classes) = partition(&rects, GROUP_EPS);
        assert_eq!(classes, 1);
        assert_eq!(labels, vec![0, 0, 0]);
    }
}
