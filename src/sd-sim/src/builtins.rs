// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::common::Ident;

#[derive(PartialEq, Clone, Debug)]
pub enum BuiltinFn<Expr> {
    Lookup(Ident, Box<Expr>),
    Abs(Box<Expr>),
    Arccos(Box<Expr>),
    Arcsin(Box<Expr>),
    Arctan(Box<Expr>),
    Cos(Box<Expr>),
    Exp(Box<Expr>),
    Inf,
    Int(Box<Expr>),
    Ln(Box<Expr>),
    Log10(Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    Mean(Vec<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Pi,
    Pulse(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    Ramp(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    SafeDiv(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    Sin(Box<Expr>),
    Sqrt(Box<Expr>),
    Step(Box<Expr>, Box<Expr>),
    Tan(Box<Expr>),
}

/// is_time_ident is true for the identifiers that name the clock
/// and run parameters rather than model variables.
pub fn is_time_ident(name: &str) -> bool {
    matches!(name, "time" | "dt" | "initial_time" | "final_time")
}

pub fn is_builtin_fn(name: &str) -> bool {
    matches!(
        name,
        "lookup"
            | "abs"
            | "arccos"
            | "arcsin"
            | "arctan"
            | "cos"
            | "exp"
            | "inf"
            | "int"
            | "ln"
            | "log10"
            | "max"
            | "mean"
            | "min"
            | "pi"
            | "pulse"
            | "ramp"
            | "safediv"
            | "sin"
            | "sqrt"
            | "step"
            | "tan"
    )
}

/// lookup linearly interpolates `index` against the points of a
/// graphical function, clamping to the first and last y-values
/// outside the table's x-range.
pub fn lookup(x: &[f64], y: &[f64], index: f64) -> f64 {
    let size = x.len().min(y.len());
    if size == 0 {
        return f64::NAN;
    }
    if index.is_nan() {
        // things get wonky below if we try to binary search for NaN
        return f64::NAN;
    }

    if index <= x[0] {
        return y[0];
    } else if index >= x[size - 1] {
        return y[size - 1];
    }

    // binary search seems to be the most appropriate choice here.
    let mut low = 0;
    let mut high = size;
    while low < high {
        let mid = low + (high - low) / 2;
        if x[mid] < index {
            low = mid + 1;
        } else {
            high = mid;
        }
    }

    let i = low;
    if approx_eq!(f64, x[i], index) {
        y[i]
    } else {
        // slope = deltaY/deltaX
        let slope = (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
        // y = m*x + b
        (index - x[i - 1]) * slope + y[i - 1]
    }
}

/// pulse is `magnitude/dt` during the single dt-wide step in which a
/// pulse fires, repeating every `interval` when it is positive.
pub fn pulse(dt: f64, time: f64, magnitude: f64, first_pulse: f64, interval: f64) -> f64 {
    if time < first_pulse {
        return 0.0;
    }

    let mut next_pulse = first_pulse;
    while time >= next_pulse {
        if time < next_pulse + dt {
            return magnitude / dt;
        } else if interval <= 0.0 {
            break;
        } else {
            next_pulse += interval;
        }
    }

    0.0
}

pub fn ramp(time: f64, slope: f64, start_time: f64, end_time: Option<f64>) -> f64 {
    if time < start_time {
        return 0.0;
    }
    match end_time {
        Some(end_time) if end_time > start_time && time > end_time => {
            (end_time - start_time) * slope
        }
        _ => (time - start_time) * slope,
    }
}

pub fn step(time: f64, height: f64, start_time: f64) -> f64 {
    if time < start_time {
        0.0
    } else {
        height
    }
}

pub fn safediv(a: f64, b: f64, alternative: Option<f64>) -> f64 {
    if b != 0.0 {
        a / b
    } else {
        alternative.unwrap_or(0.0)
    }
}

#[test]
fn test_is_builtin_fn() {
    assert!(is_builtin_fn("lookup"));
    assert!(!is_builtin_fn("lookupz"));
    assert!(is_builtin_fn("log10"));
    assert!(is_builtin_fn("ramp"));
    assert!(!is_builtin_fn("smth1"));
    assert!(is_time_ident("dt"));
    assert!(!is_time_ident("step"));
    assert!(!is_builtin_fn("time"));
}

#[test]
fn test_lookup() {
    let x = [-1.0, 1.0, 2.0, 3.0];
    let y = [0.5, 1.0, 5.0, -5.0];

    let cases: &[(f64, f64)] = &[
        (-10.0, 0.5),
        (-1.0, 0.5),
        (0.0, 0.75),
        (1.0, 1.0),
        (1.5, 3.0),
        (2.0, 5.0),
        (2.5, 0.0),
        (3.0, -5.0),
        (9.0, -5.0),
    ];

    for (index, expected) in cases.iter() {
        let actual = lookup(&x, &y, *index);
        assert!(
            approx_eq!(f64, *expected, actual, epsilon = 1e-12),
            "lookup({}) = {}, expected {}",
            index,
            actual,
            expected
        );
    }

    assert!(lookup(&[], &[], 1.0).is_nan());
    assert!(lookup(&x, &y, f64::NAN).is_nan());
}

#[test]
fn test_pulse() {
    let dt = 0.5;
    // before the first pulse
    assert_eq!(0.0, pulse(dt, 1.0, 10.0, 2.0, 0.0));
    assert_eq!(20.0, pulse(dt, 2.0, 10.0, 2.0, 0.0));
    assert_eq!(0.0, pulse(dt, 2.5, 10.0, 2.0, 0.0));
    // repeating
    assert_eq!(20.0, pulse(dt, 5.0, 10.0, 2.0, 3.0));
    assert_eq!(0.0, pulse(dt, 6.0, 10.0, 2.0, 3.0));
}

#[test]
fn test_ramp_and_step() {
    assert_eq!(0.0, ramp(1.0, 2.0, 5.0, None));
    assert_eq!(4.0, ramp(7.0, 2.0, 5.0, None));
    assert_eq!(6.0, ramp(20.0, 2.0, 5.0, Some(8.0)));
    // an end before the start is ignored
    assert_eq!(30.0, ramp(20.0, 2.0, 5.0, Some(1.0)));

    assert_eq!(0.0, step(2.9, 6.0, 3.0));
    assert_eq!(6.0, step(3.0, 6.0, 3.0));
}

#[test]
fn test_safediv() {
    assert_eq!(2.0, safediv(4.0, 2.0, None));
    assert_eq!(0.0, safediv(4.0, 0.0, None));
    assert_eq!(7.0, safediv(4.0, 0.0, Some(7.0)));
}
