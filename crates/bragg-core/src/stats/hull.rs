//! Convex hull volume in three dimensions
//!
//! Incremental hull construction: start from an extreme tetrahedron, then
//! fold each remaining point in by replacing the faces it can see with a
//! cone of new faces over the horizon edges. Degenerate inputs (fewer
//! than four points, collinear or coplanar sets) have zero volume and
//! never error, matching the caller contract for missing-region clusters.

type Point = [f64; 3];
type Face = (usize, usize, usize);

fn sub(a: Point, b: Point) -> Point {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(u: Point, v: Point) -> Point {
    [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ]
}

fn dot(u: Point, v: Point) -> f64 {
    u[0] * v[0] + u[1] * v[1] + u[2] * v[2]
}

fn norm(u: Point) -> f64 {
    dot(u, u).sqrt()
}

/// Signed distance of `p` from the plane of face (a, b, c), positive on
/// the side the face normal points to.
fn signed_distance(a: Point, b: Point, c: Point, p: Point) -> f64 {
    dot(cross(sub(b, a), sub(c, a)), sub(p, a))
}

/// Pick four points spanning a non-degenerate tetrahedron, or `None`
/// when all points are (nearly) coplanar.
fn initial_tetrahedron(points: &[Point], eps: f64) -> Option<[usize; 4]> {
    let i0 = 0;
    let i1 = (0..points.len())
        .max_by(|&i, &j| {
            norm(sub(points[i], points[i0])).total_cmp(&norm(sub(points[j], points[i0])))
        })?;
    if norm(sub(points[i1], points[i0])) <= eps {
        return None;
    }
    let edge = sub(points[i1], points[i0]);
    let i2 = (0..points.len())
        .max_by(|&i, &j| {
            let di = norm(cross(edge, sub(points[i], points[i0])));
            let dj = norm(cross(edge, sub(points[j], points[i0])));
            di.total_cmp(&dj)
        })?;
    if norm(cross(edge, sub(points[i2], points[i0]))) <= eps {
        return None;
    }
    let i3 = (0..points.len())
        .max_by(|&i, &j| {
            let di = signed_distance(points[i0], points[i1], points[i2], points[i]).abs();
            let dj = signed_distance(points[i0], points[i1], points[i2], points[j]).abs();
            di.total_cmp(&dj)
        })?;
    if signed_distance(points[i0], points[i1], points[i2], points[i3]).abs() <= eps {
        return None;
    }
    Some([i0, i1, i2, i3])
}

/// Orient `face` so its normal points away from the interior point `o`
fn outward(points: &[Point], face: Face, o: Point) -> Face {
    let (a, b, c) = face;
    if signed_distance(points[a], points[b], points[c], o) > 0.0 {
        (a, c, b)
    } else {
        face
    }
}

/// Volume of the convex hull of `points`. Returns 0.0 for degenerate
/// inputs instead of erroring.
pub fn convex_hull_volume(points: &[Point]) -> f64 {
    if points.len() < 4 {
        return 0.0;
    }

    // Scale-relative tolerance
    let extent = points
        .iter()
        .flat_map(|p| p.iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
        .max(1.0);
    let eps = 1e-9 * extent;

    let Some([i0, i1, i2, i3]) = initial_tetrahedron(points, eps) else {
        return 0.0;
    };

    let o = [
        (points[i0][0] + points[i1][0] + points[i2][0] + points[i3][0]) / 4.0,
        (points[i0][1] + points[i1][1] + points[i2][1] + points[i3][1]) / 4.0,
        (points[i0][2] + points[i1][2] + points[i2][2] + points[i3][2]) / 4.0,
    ];

    let mut faces: Vec<Face> = [
        (i0, i1, i2),
        (i0, i1, i3),
        (i0, i2, i3),
        (i1, i2, i3),
    ]
    .into_iter()
    .map(|f| outward(points, f, o))
    .collect();

    let in_tetra = [i0, i1, i2, i3];
    for (idx, &p) in points.iter().enumerate() {
        if in_tetra.contains(&idx) {
            continue;
        }

        let visible: Vec<usize> = (0..faces.len())
            .filter(|&fi| {
                let (a, b, c) = faces[fi];
                signed_distance(points[a], points[b], points[c], p) > eps
            })
            .collect();
        if visible.is_empty() {
            continue; // interior point
        }

        // Horizon: directed edges of visible faces whose reverse is not
        // itself an edge of a visible face.
        let mut edges: Vec<(usize, usize)> = Vec::with_capacity(visible.len() * 3);
        for &fi in &visible {
            let (a, b, c) = faces[fi];
            edges.push((a, b));
            edges.push((b, c));
            edges.push((c, a));
        }
        let horizon: Vec<(usize, usize)> = edges
            .iter()
            .copied()
            .filter(|(a, b)| !edges.contains(&(*b, *a)))
            .collect();

        // Replace visible faces with the cone over the horizon
        let mut keep: Vec<Face> = faces
            .iter()
            .enumerate()
            .filter(|(fi, _)| !visible.contains(fi))
            .map(|(_, f)| *f)
            .collect();
        for (a, b) in horizon {
            keep.push(outward(points, (a, b, idx), o));
        }
        faces = keep;
    }

    let signed: f64 = faces
        .iter()
        .map(|&(a, b, c)| {
            dot(
                sub(points[a], o),
                cross(sub(points[b], o), sub(points[c], o)),
            ) / 6.0
        })
        .sum();
    signed.abs()
}
