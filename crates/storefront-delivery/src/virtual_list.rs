//! Visible-window computation for virtualized lists

use crate::{Clock, DeliveryError, Result, Throttle};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

/// Rows rendered beyond each edge of the viewport by default
pub const DEFAULT_OVERSCAN: usize = 5;

/// Slice of a list that must be rendered for the current scroll position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleWindow {
    /// First rendered index
    pub start_index: usize,
    /// Last rendered index (inclusive); `None` for an empty list
    pub end_index: Option<usize>,
    /// Vertical offset of the first rendered row
    pub offset_y: f64,
}

impl VisibleWindow {
    pub const EMPTY: VisibleWindow = VisibleWindow {
        start_index: 0,
        end_index: None,
        offset_y: 0.0,
    };

    /// Indices to render as a half-open range
    pub fn range(&self) -> Range<usize> {
        match self.end_index {
            Some(end) => self.start_index..end + 1,
            None => 0..0,
        }
    }

    pub fn len(&self) -> usize {
        self.range().len()
    }

    pub fn is_empty(&self) -> bool {
        self.end_index.is_none()
    }
}

/// Compute which rows to render.
///
/// The scroll-derived start row is clamped to the last item, so scrolling past
/// the end of a shrunken list still yields the tail of the list.
pub fn compute_window(
    scroll_top: f64,
    container_height: f64,
    item_height: f64,
    total_items: usize,
    overscan: usize,
) -> Result<VisibleWindow> {
    if !(item_height.is_finite() && item_height > 0.0) {
        return Err(DeliveryError::InvalidArgument(format!(
            "item height must be positive, got {}",
            item_height
        )));
    }
    if total_items == 0 {
        return Ok(VisibleWindow::EMPTY);
    }

    let last = total_items - 1;
    let scroll_top = if scroll_top.is_finite() { scroll_top.max(0.0) } else { 0.0 };
    let container_height = if container_height.is_finite() {
        container_height.max(0.0)
    } else {
        0.0
    };

    let raw_start = ((scroll_top / item_height).floor() as usize).min(last);
    let visible_rows = (container_height / item_height).ceil() as usize;
    let raw_end = raw_start.saturating_add(visible_rows);

    let start_index = raw_start.saturating_sub(overscan);
    let end_index = raw_end.saturating_add(overscan).min(last);

    Ok(VisibleWindow {
        start_index,
        end_index: Some(end_index),
        offset_y: start_index as f64 * item_height,
    })
}

/// Scroll-driven window tracker for a fixed-row-height list
pub struct VirtualList {
    item_height: f64,
    container_height: f64,
    overscan: usize,
    total_items: usize,
    scroll_top: f64,
    window: VisibleWindow,
    throttle: Throttle,
}

impl VirtualList {
    /// Create a list tracker; scroll updates are throttled to `scroll_throttle`
    pub fn new(
        item_height: f64,
        container_height: f64,
        total_items: usize,
        scroll_throttle: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let window = compute_window(0.0, container_height, item_height, total_items, DEFAULT_OVERSCAN)?;
        Ok(Self {
            item_height,
            container_height,
            overscan: DEFAULT_OVERSCAN,
            total_items,
            scroll_top: 0.0,
            window,
            throttle: Throttle::new(scroll_throttle, clock),
        })
    }

    /// Set overscan
    pub fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self.recompute();
        self
    }

    /// Feed a scroll position; returns the new window if the update was admitted
    pub fn on_scroll(&mut self, scroll_top: f64) -> Option<VisibleWindow> {
        if !self.throttle.try_acquire() {
            return None;
        }
        self.scroll_top = scroll_top;
        self.recompute();
        Some(self.window)
    }

    /// Update the item count (e.g. after a filter), recomputing immediately
    pub fn set_total_items(&mut self, total_items: usize) -> VisibleWindow {
        self.total_items = total_items;
        self.recompute();
        self.window
    }

    /// Update the viewport height, recomputing immediately
    pub fn set_container_height(&mut self, container_height: f64) -> VisibleWindow {
        self.container_height = container_height;
        self.recompute();
        self.window
    }

    /// Last computed window
    pub fn window(&self) -> VisibleWindow {
        self.window
    }

    /// Items of `items` inside the current window
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let range = self.window.range();
        let end = range.end.min(items.len());
        let start = range.start.min(end);
        &items[start..end]
    }

    /// Height of the full scrollable content
    pub fn total_height(&self) -> f64 {
        self.total_items as f64 * self.item_height
    }

    fn recompute(&mut self) {
        // item_height was validated in `new`, so this cannot fail.
        if let Ok(window) = compute_window(
            self.scroll_top,
            self.container_height,
            self.item_height,
            self.total_items,
            self.overscan,
        ) {
            self.window = window;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    #[test]
    fn test_window_at_top() {
        let window = compute_window(0.0, 500.0, 100.0, 20, 2).unwrap();
        assert_eq!(window.start_index, 0);
        assert_eq!(window.end_index, Some(7));
        assert_eq!(window.offset_y, 0.0);
    }

    #[test]
    fn test_window_scrolled_past_short_list() {
        let window = compute_window(1000.0, 500.0, 100.0, 5, 5).unwrap();
        assert_eq!(window.start_index, 0);
        assert_eq!(window.end_index, Some(4));
        assert_eq!(window.offset_y, 0.0);
    }

    #[test]
    fn test_window_mid_list() {
        let window = compute_window(2050.0, 500.0, 100.0, 1000, DEFAULT_OVERSCAN).unwrap();
        assert_eq!(window.start_index, 15);
        assert_eq!(window.end_index, Some(30));
        assert_eq!(window.offset_y, 1500.0);
        assert_eq!(window.len(), 16);
    }

    #[test]
    fn test_empty_list() {
        let window = compute_window(0.0, 500.0, 100.0, 0, 5).unwrap();
        assert_eq!(window, VisibleWindow::EMPTY);
        assert!(window.is_empty());
        assert_eq!(window.range(), 0..0);
    }

    #[test]
    fn test_non_positive_item_height_rejected() {
        for height in [0.0, -10.0, f64::NAN] {
            assert!(matches!(
                compute_window(0.0, 500.0, height, 10, 5),
                Err(DeliveryError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_virtual_list_throttles_scroll() {
        let clock = Arc::new(ManualClock::new());
        let items: Vec<u32> = (0..100).collect();
        let mut list = VirtualList::new(50.0, 200.0, items.len(), Duration::from_millis(16), clock.clone())
            .unwrap()
            .with_overscan(1);

        assert_eq!(list.slice(&items), &items[0..6]);

        let window = list.on_scroll(500.0).unwrap();
        assert_eq!(window.start_index, 9);
        assert!(list.on_scroll(1000.0).is_none());

        clock.advance(Duration::from_millis(16));
        let window = list.on_scroll(1000.0).unwrap();
        assert_eq!(window.start_index, 19);
        assert_eq!(list.slice(&items).first(), Some(&19));
        assert_eq!(list.total_height(), 5000.0);
    }

    #[test]
    fn test_shrinking_list_keeps_window_in_bounds() {
        let clock = Arc::new(ManualClock::new());
        let mut list = VirtualList::new(100.0, 500.0, 1000, Duration::ZERO, clock).unwrap();
        list.on_scroll(50_000.0);
        let window = list.set_total_items(3);
        assert_eq!(window.range(), 0..3);
    }
}
