//! Scrolling bar graph of round-trip times for both directions.
//!
//! Columns alternate between the two directions, newest on the right. The
//! y-axis is rescaled on every draw so that the tallest visible bar fills the
//! graph, and each character row is split into eight sub-levels using the
//! block glyphs below.

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::widgets::Widget;

use crate::format::{format_latency, Align, PLACEHOLDER};
use crate::palette;
use crate::stats::LatencyWindow;
use crate::types::{Direction, Latency, LatencyRecord};

/// Empty, then one to eight eighths of a cell.
pub const BAR_GLYPHS: [&str; 9] = [" ", "▁", "▂", "▃", "▄", "▅", "▆", "▇", "█"];

/// Columns reserved left of the graph for the axis and its labels.
pub const AXIS_WIDTH: u16 = 7;

/// One graph column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bar {
    pub direction: Direction,
    pub latency: LatencyRecord,
}

/// Direction that owns the rightmost column.
///
/// Participant one sends first, so one -> two is always a sample ahead
/// mid-exchange; with equal counts the latest round trip went two -> one.
pub fn newest_direction(one_to_two: &LatencyWindow, two_to_one: &LatencyWindow) -> Direction {
    if one_to_two.count() > two_to_one.count() {
        Direction::OneToTwo
    } else {
        Direction::TwoToOne
    }
}

/// Lays out `width` columns, oldest first. Columns past the end of a
/// direction's history are zero-height bars.
pub fn layout_bars(
    one_to_two: &LatencyWindow,
    two_to_one: &LatencyWindow,
    width: usize,
) -> Vec<Bar> {
    let mut direction = newest_direction(one_to_two, two_to_one);

    let newest_first = |window: &LatencyWindow| -> Vec<LatencyRecord> {
        window.history().rev().take(width.div_ceil(2)).copied().collect()
    };
    let one_to_two = newest_first(one_to_two);
    let two_to_one = newest_first(two_to_one);

    let mut bars = Vec::with_capacity(width);

    for i in 0..width {
        let recent = match direction {
            Direction::OneToTwo => &one_to_two,
            Direction::TwoToOne => &two_to_one,
        };
        bars.push(Bar {
            direction,
            latency: recent.get(i / 2).copied().unwrap_or_default(),
        });
        direction = match direction {
            Direction::OneToTwo => Direction::TwoToOne,
            Direction::TwoToOne => Direction::OneToTwo,
        };
    }

    bars.reverse();
    bars
}

/// Latency represented by one full character row: the largest visible total
/// divided by `rows`, rounded up. Zero when nothing is taller than zero.
pub fn cell_unit(bars: &[Bar], rows: u16) -> Latency {
    let max_total = bars
        .iter()
        .map(|bar| bar.latency.total)
        .fold(Latency::ZERO, Latency::max);
    if rows == 0 {
        return Latency::ZERO;
    }
    let (max_total, rows) = (max_total.as_nanos(), i64::from(rows));
    let round_up = i64::from(max_total % rows != 0);
    Latency::from_nanos(max_total / rows + round_up)
}

/// Index into [`BAR_GLYPHS`] for character row `row` (0 at the bottom).
pub fn fill_level(total: Latency, row: u16, cell_unit: Latency) -> usize {
    if !cell_unit.is_positive() {
        return 0;
    }
    let row = i64::from(row);
    let full = BAR_GLYPHS.len() - 1;

    if total >= cell_unit * (row + 1) {
        full
    } else if total > cell_unit * row {
        let fraction =
            (total - cell_unit * row).as_nanos() as f64 / cell_unit.as_nanos() as f64;
        (fraction * full as f64).round() as usize
    } else {
        0
    }
}

/// Bar colour of a direction, matching the user who sent the probe.
pub fn bar_style(direction: Direction) -> Style {
    match direction {
        Direction::OneToTwo => palette::BAR_ONE_TO_TWO,
        Direction::TwoToOne => palette::BAR_TWO_TO_ONE,
    }
}

/// Bar graph over both directions' histories, with a labelled y-axis on the
/// left. Draws only the axis and gridlines until the first sample arrives.
pub struct Graph<'a> {
    pub one_to_two: &'a LatencyWindow,
    pub two_to_one: &'a LatencyWindow,
}

impl Widget for Graph<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width <= AXIS_WIDTH || area.height < 1 {
            return;
        }

        let x = area.x + AXIS_WIDTH;
        let width = area.width - AXIS_WIDTH;
        let height = area.height;
        let bottom = area.bottom() - 1;

        buf.set_string(x - 3, bottom, "0 ", palette::GRAPH_BRIGHT);
        buf.set_string(x - 1, bottom, "┃", palette::GRAPH_AXIS);
        buf.set_string(x, bottom, "▁".repeat(width as usize), palette::GRAPH);

        for i in 1..height {
            let y = bottom - i;
            if i % 2 == 0 {
                let gridline = format!("{PLACEHOLDER} ╂{}", "╌".repeat(width as usize));
                buf.set_string(area.x, y, gridline, palette::GRAPH);
            } else {
                buf.set_string(x - 1, y, "┃", palette::GRAPH);
            }
        }

        if self.one_to_two.count() < 1 {
            return;
        }

        let bars = layout_bars(self.one_to_two, self.two_to_one, width as usize);
        let unit = cell_unit(&bars, height);

        for i in (2..height).step_by(2) {
            let label = format_latency(unit * i64::from(i) + unit / 2, Align::Right);
            buf.set_string(area.x, bottom - i, label, palette::GRAPH_BRIGHT);
        }

        for (column, bar) in (x..).zip(&bars) {
            let style = bar_style(bar.direction);
            for row in 0..height {
                let level = fill_level(bar.latency.total, row, unit);
                // Level 0 leaves the gridline underneath visible.
                if level == 0 {
                    continue;
                }
                if let Some(cell) = buf.cell_mut((column, bottom - row)) {
                    cell.set_symbol(BAR_GLYPHS[level]).set_style(style);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(total_ms: i64) -> LatencyRecord {
        LatencyRecord {
            total: Latency::from_millis(total_ms),
            ..LatencyRecord::default()
        }
    }

    fn window(totals: &[i64]) -> LatencyWindow {
        let mut window = LatencyWindow::new();
        for &total in totals {
            window.update(record(total));
        }
        window
    }

    fn symbol(buf: &Buffer, x: u16, y: u16) -> &str {
        buf.cell((x, y)).expect("inside buffer").symbol()
    }

    #[test]
    fn newest_column_goes_to_the_direction_ahead() {
        let a = window(&[10, 20, 30]);
        let b = window(&[40, 50]);

        // 3/2 split: the larger count owns the newest column
        let bars = layout_bars(&a, &b, 6);
        assert_eq!(bars[5].direction, Direction::OneToTwo);
        assert_eq!(bars[5].latency, record(30));
        assert_eq!(bars[4].direction, Direction::TwoToOne);
        assert_eq!(bars[4].latency, record(50));
        assert_eq!(bars[3].latency, record(20));
        assert_eq!(bars[2].latency, record(40));
        assert_eq!(bars[1].latency, record(10));
        assert_eq!(bars[0].direction, Direction::TwoToOne);
        assert_eq!(bars[0].latency, LatencyRecord::default());
    }

    #[test]
    fn equal_counts_give_the_newest_column_to_two_to_one() {
        let a = window(&[10, 20]);
        let b = window(&[30, 40]);
        let bars = layout_bars(&a, &b, 4);
        assert_eq!(bars[3].direction, Direction::TwoToOne);
        assert_eq!(bars[3].latency, record(40));
        assert_eq!(bars[2].direction, Direction::OneToTwo);
        assert_eq!(bars[2].latency, record(20));
    }

    #[test]
    fn cell_unit_rounds_up() {
        let bars = layout_bars(&window(&[100]), &window(&[]), 4);
        assert_eq!(cell_unit(&bars, 3), Latency::from_nanos(33_333_334));
        assert_eq!(cell_unit(&bars, 4), Latency::from_millis(25));
    }

    #[test]
    fn cell_unit_of_huge_totals_does_not_overflow() {
        let mut huge = LatencyWindow::new();
        huge.update(LatencyRecord {
            total: Latency::from_nanos(i64::MAX),
            ..LatencyRecord::default()
        });
        let bars = layout_bars(&huge, &window(&[]), 2);
        assert_eq!(cell_unit(&bars, 2), Latency::from_nanos(i64::MAX / 2 + 1));
    }

    #[test]
    fn all_zero_totals_do_not_divide_by_zero() {
        let bars = layout_bars(&window(&[0, 0]), &window(&[0]), 8);
        let unit = cell_unit(&bars, 10);
        assert_eq!(unit, Latency::ZERO);
        for bar in &bars {
            for row in 0..10 {
                assert_eq!(fill_level(bar.latency.total, row, unit), 0);
            }
        }
    }

    #[test]
    fn fill_levels_use_eighths() {
        let unit = Latency::from_millis(80);
        let total = Latency::from_millis(130);
        assert_eq!(fill_level(total, 0, unit), 8);
        // 50ms of an 80ms cell is 5/8
        assert_eq!(fill_level(total, 1, unit), 5);
        assert_eq!(fill_level(total, 2, unit), 0);
        // exactly on a boundary: the row above stays empty
        assert_eq!(fill_level(Latency::from_millis(160), 1, unit), 8);
        assert_eq!(fill_level(Latency::from_millis(160), 2, unit), 0);
        // too small to show in its row
        assert_eq!(fill_level(Latency::from_millis(4), 0, unit), 0);
    }

    #[test]
    fn renders_axis_placeholders_without_data() {
        let empty = LatencyWindow::new();
        let area = Rect::new(0, 0, 20, 5);
        let mut buf = Buffer::empty(area);
        Graph {
            one_to_two: &empty,
            two_to_one: &empty,
        }
        .render(area, &mut buf);

        assert_eq!(symbol(&buf, 4, 4), "0");
        assert_eq!(symbol(&buf, 6, 4), "┃");
        assert_eq!(symbol(&buf, 7, 4), "▁");
        assert_eq!(symbol(&buf, 0, 2), "·");
        assert_eq!(symbol(&buf, 6, 2), "╂");
        assert_eq!(symbol(&buf, 7, 2), "╌");
        assert_eq!(symbol(&buf, 6, 3), "┃");
    }

    #[test]
    fn renders_bars_and_labels() {
        let a = window(&[40]);
        let b = window(&[]);
        let area = Rect::new(0, 0, 11, 4);
        let mut buf = Buffer::empty(area);
        Graph {
            one_to_two: &a,
            two_to_one: &b,
        }
        .render(area, &mut buf);

        // 40ms over 4 rows: 10ms per row, the single bar fills the column
        let newest = area.right() - 1;
        for y in 0..4 {
            assert_eq!(symbol(&buf, newest, y), "█");
            assert_eq!(
                buf.cell((newest, y)).expect("inside").style().fg,
                bar_style(Direction::OneToTwo).fg
            );
        }
        // empty two -> one column keeps the gridline
        assert_eq!(symbol(&buf, newest - 1, 1), "╌");
        // label of row 2: 2 * 10ms + 5ms
        let label: String = (0..5).map(|x| symbol(&buf, x, 1)).collect();
        assert_eq!(label, " 25ms");
    }

    #[test]
    fn narrow_area_draws_nothing() {
        let a = window(&[40]);
        let area = Rect::new(0, 0, 7, 4);
        let mut buf = Buffer::empty(area);
        Graph {
            one_to_two: &a,
            two_to_one: &a,
        }
        .render(area, &mut buf);
        assert_eq!(buf, Buffer::empty(area));
    }
}
