//! Candlestick pattern recognizers.
//!
//! Each pattern emits +100 (bullish), -100 (bearish) or 0 per bar.

use crate::domain::Bar;
use crate::family::{ColumnSink, FamilyContext, FamilyError, IndicatorFamily};

#[derive(Debug, Clone, Copy, Default)]
pub struct Candlestick;

type Recognizer = fn(&[Bar], usize) -> f64;

const PATTERNS: [(&str, Recognizer); 9] = [
    ("CDLDOJI", doji),
    ("CDLHAMMER", hammer),
    ("CDLSHOOTINGSTAR", shooting_star),
    ("CDLENGULFING", engulfing),
    ("CDLHARAMI", harami),
    ("CDLMARUBOZU", marubozu),
    ("CDLSPINNINGTOP", spinning_top),
    ("CDL3WHITESOLDIERS", three_white_soldiers),
    ("CDL3BLACKCROWS", three_black_crows),
];

impl IndicatorFamily for Candlestick {
    fn name(&self) -> &str {
        "Candlestick"
    }

    fn min_rows(&self) -> usize {
        10
    }

    fn compute(&self, ctx: &FamilyContext, sink: &mut ColumnSink<'_>) -> Result<(), FamilyError> {
        let bars = ctx.series().bars();
        for (name, recognize) in PATTERNS {
            let values = (0..bars.len()).map(|i| recognize(bars, i)).collect();
            sink.emit(name, values)?;
        }
        Ok(())
    }
}

struct Shape {
    body: f64,
    range: f64,
    upper: f64,
    lower: f64,
    bullish: bool,
    bearish: bool,
}

fn shape(b: &Bar) -> Shape {
    Shape {
        body: (b.close - b.open).abs(),
        range: b.high - b.low,
        upper: b.high - b.open.max(b.close),
        lower: b.open.min(b.close) - b.low,
        bullish: b.close > b.open,
        bearish: b.close < b.open,
    }
}

fn signal(bullish: bool, bearish: bool) -> f64 {
    if bullish {
        100.0
    } else if bearish {
        -100.0
    } else {
        0.0
    }
}

fn doji(bars: &[Bar], i: usize) -> f64 {
    let s = shape(&bars[i]);
    if s.range > 0.0 && s.body <= 0.1 * s.range {
        100.0
    } else {
        0.0
    }
}

fn hammer(bars: &[Bar], i: usize) -> f64 {
    let s = shape(&bars[i]);
    if s.range > 0.0 && s.body > 0.0 && s.lower >= 2.0 * s.body && s.upper <= s.body {
        100.0
    } else {
        0.0
    }
}

fn shooting_star(bars: &[Bar], i: usize) -> f64 {
    let s = shape(&bars[i]);
    if s.range > 0.0 && s.body > 0.0 && s.upper >= 2.0 * s.body && s.lower <= s.body {
        -100.0
    } else {
        0.0
    }
}

fn engulfing(bars: &[Bar], i: usize) -> f64 {
    if i == 0 {
        return 0.0;
    }
    let (p, c) = (&bars[i - 1], &bars[i]);
    let (ps, cs) = (shape(p), shape(c));
    let up = ps.bearish && cs.bullish && c.open <= p.close && c.close >= p.open;
    let down = ps.bullish && cs.bearish && c.open >= p.close && c.close <= p.open;
    signal(up, down)
}

fn harami(bars: &[Bar], i: usize) -> f64 {
    if i == 0 {
        return 0.0;
    }
    let (p, c) = (&bars[i - 1], &bars[i]);
    let (ps, cs) = (shape(p), shape(c));
    let inside = c.open.max(c.close) < p.open.max(p.close)
        && c.open.min(c.close) > p.open.min(p.close);
    signal(
        inside && ps.bearish && cs.bullish,
        inside && ps.bullish && cs.bearish,
    )
}

fn marubozu(bars: &[Bar], i: usize) -> f64 {
    let s = shape(&bars[i]);
    let full = s.range > 0.0 && s.body >= 0.95 * s.range;
    signal(full && s.bullish, full && s.bearish)
}

fn spinning_top(bars: &[Bar], i: usize) -> f64 {
    let s = shape(&bars[i]);
    let spinning = s.range > 0.0 && s.body > 0.0 && s.body <= 0.3 * s.range && s.upper > s.body && s.lower > s.body;
    signal(spinning && s.bullish, spinning && s.bearish)
}

fn three_white_soldiers(bars: &[Bar], i: usize) -> f64 {
    if i < 2 {
        return 0.0;
    }
    let w = &bars[i - 2..=i];
    let rising = w.iter().all(|b| b.close > b.open)
        && w.windows(2).all(|p| {
            p[1].close > p[0].close && p[1].open > p[0].open && p[1].open <= p[0].close
        });
    if rising {
        100.0
    } else {
        0.0
    }
}

fn three_black_crows(bars: &[Bar], i: usize) -> f64 {
    if i < 2 {
        return 0.0;
    }
    let w = &bars[i - 2..=i];
    let falling = w.iter().all(|b| b.close < b.open)
        && w.windows(2).all(|p| {
            p[1].close < p[0].close && p[1].open < p[0].open && p[1].open >= p[0].close
        });
    if falling {
        -100.0
    } else {
        0.0
    }
}
