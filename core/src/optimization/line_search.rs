//! One-dimensional minimization along a search direction
//!
//! Golden-section bracketing followed by Brent's parabolic interpolation.
//! Both routines only need function values.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

const GOLDEN_RATIO: f64 = 1.618034;
const GOLDEN_SECTION: f64 = 0.381_966_0;
const MAX_MAGNIFICATION: f64 = 100.0;
const TINY: f64 = 1.0e-20;
const ZEPS: f64 = 1.0e-10;

/// Three abscissae with `f(b) <= f(a)` and `f(b) <= f(c)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub fa: f64,
    pub fb: f64,
    pub fc: f64,
}

#[inline]
fn sign(magnitude: f64, direction: f64) -> f64 {
    if direction >= 0.0 {
        magnitude.abs()
    } else {
        -magnitude.abs()
    }
}

/// Expand downhill from `[a, b]` until a minimum is bracketed.
///
/// Gives up after `max_expansions` steps and returns the last triple, which
/// then only satisfies `f(b) <= f(a)`.
pub fn bracket_minimum<F>(mut f: F, a: f64, b: f64, max_expansions: usize) -> Bracket
where
    F: FnMut(f64) -> f64,
{
    let (mut ax, mut bx) = (a, b);
    let (mut fa, mut fb) = (f(ax), f(bx));
    if fb > fa {
        std::mem::swap(&mut ax, &mut bx);
        std::mem::swap(&mut fa, &mut fb);
    }
    let mut cx = bx + GOLDEN_RATIO * (bx - ax);
    let mut fc = f(cx);

    let mut expansions = 0;
    while fb > fc && expansions < max_expansions {
        expansions += 1;

        let r = (bx - ax) * (fb - fc);
        let q = (bx - cx) * (fb - fa);
        let mut u = bx - ((bx - cx) * q - (bx - ax) * r) / (2.0 * sign((q - r).abs().max(TINY), q - r));
        let ulim = bx + MAX_MAGNIFICATION * (cx - bx);
        let mut fu;

        if (bx - u) * (u - cx) > 0.0 {
            // Parabolic u lies between b and c.
            fu = f(u);
            if fu < fc {
                return Bracket { a: bx, b: u, c: cx, fa: fb, fb: fu, fc };
            } else if fu > fb {
                return Bracket { a: ax, b: bx, c: u, fa, fb, fc: fu };
            }
            u = cx + GOLDEN_RATIO * (cx - bx);
            fu = f(u);
        } else if (cx - u) * (u - ulim) > 0.0 {
            fu = f(u);
            if fu < fc {
                bx = cx;
                cx = u;
                u = cx + GOLDEN_RATIO * (cx - bx);
                fb = fc;
                fc = fu;
                fu = f(u);
            }
        } else if (u - ulim) * (ulim - cx) >= 0.0 {
            u = ulim;
            fu = f(u);
        } else {
            u = cx + GOLDEN_RATIO * (cx - bx);
            fu = f(u);
        }

        ax = bx;
        bx = cx;
        cx = u;
        fa = fb;
        fb = fc;
        fc = fu;
    }

    Bracket { a: ax, b: bx, c: cx, fa, fb, fc }
}

/// Brent's method inside `bracket` to fractional precision `tolerance`.
/// Returns the abscissa and value of the minimum found.
pub fn brent<F>(mut f: F, bracket: &Bracket, tolerance: f64, max_iterations: usize) -> (f64, f64)
where
    F: FnMut(f64) -> f64,
{
    let mut a = bracket.a.min(bracket.c);
    let mut b = bracket.a.max(bracket.c);
    let (mut x, mut w, mut v) = (bracket.b, bracket.b, bracket.b);
    let mut fx = bracket.fb;
    let (mut fw, mut fv) = (fx, fx);
    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for _ in 0..max_iterations {
        let xm = 0.5 * (a + b);
        let tol1 = tolerance * x.abs() + ZEPS;
        let tol2 = 2.0 * tol1;
        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            return (x, fx);
        }

        if e.abs() > tol1 {
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let etemp = e;
            e = d;
            if p.abs() >= (0.5 * q * etemp).abs() || p <= q * (a - x) || p >= q * (b - x) {
                e = if x >= xm { a - x } else { b - x };
                d = GOLDEN_SECTION * e;
            } else {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = sign(tol1, xm - x);
                }
            }
        } else {
            e = if x >= xm { a - x } else { b - x };
            d = GOLDEN_SECTION * e;
        }

        let u = if d.abs() >= tol1 { x + d } else { x + sign(tol1, d) };
        let fu = f(u);

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            w = x;
            x = u;
            fv = fw;
            fw = fx;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                w = u;
                fv = fw;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    (x, fx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bracket_contains_minimum() {
        let f = |x: f64| (x - 3.0).powi(2);
        let br = bracket_minimum(f, 0.0, 1.0, 50);
        assert!(br.fb <= br.fa && br.fb <= br.fc);
        assert!(br.a.min(br.c) < 3.0 && 3.0 < br.a.max(br.c));
    }

    #[test]
    fn test_bracket_handles_reversed_start() {
        let f = |x: f64| (x + 2.0).powi(2);
        let br = bracket_minimum(f, 0.0, 1.0, 50);
        assert!(br.a.min(br.c) < -2.0 && -2.0 < br.a.max(br.c));
    }

    #[test]
    fn test_brent_finds_quartic_minimum() {
        let f = |x: f64| (x - 0.7).powi(4) + 0.5 * (x - 0.7).powi(2) + 1.0;
        let br = bracket_minimum(f, 0.0, 1.0, 50);
        let (x, fx) = brent(f, &br, 1e-8, 100);
        assert_abs_diff_eq!(x, 0.7, epsilon = 1e-5);
        assert_abs_diff_eq!(fx, 1.0, epsilon = 1e-9);
    }
}
