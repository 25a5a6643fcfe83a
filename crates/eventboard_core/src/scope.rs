//! Composable event query scopes.
//!
//! # Responsibility
//! - Name the time and category filters callers use to find events.
//! - Record scope composition as an ordered list of steps.
//! - Evaluate a query over an in-memory event slice.
//!
//! # Invariants
//! - Steps apply strictly left to right; a filter added after a limit
//!   only sees the limited rows.
//! - Every time-based step is parameterised by an explicit `now`
//!   (epoch milliseconds); scopes never read the wall clock.
//!
//! # See also
//! - crate::repo::event_repo for the SQL evaluation of the same steps.

use crate::model::event::{Event, Recurrence};

/// Row count used by [`EventQuery::next_default`].
pub const DEFAULT_NEXT_LIMIT: u32 = 1;

/// Sort direction for date ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One query operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeStep {
    /// Keep events with `date > now`.
    After(i64),
    /// Keep events with `date <= now`.
    AtOrBefore(i64),
    /// Sort by date, ties broken by ascending id.
    OrderByDate(SortOrder),
    /// Keep at most `n` rows.
    Limit(u32),
    /// Keep events of one category.
    Category(Recurrence),
}

/// Ordered scope chain.
///
/// ```
/// use eventboard_core::EventQuery;
///
/// let now = 1_700_000_000_000;
/// let query = EventQuery::next(now, 5).special();
/// assert_eq!(query, EventQuery::next_five_special(now));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    steps: Vec<ScopeStep>,
}

impl EventQuery {
    /// Unfiltered query over every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Events strictly after `now`, unordered.
    pub fn future(now: i64) -> Self {
        Self::all().after(now)
    }

    /// Events at or before `now`, most recent first.
    pub fn past(now: i64) -> Self {
        Self::all()
            .at_or_before(now)
            .order_by_date(SortOrder::Descending)
    }

    /// Up to `limit` future events, soonest first.
    pub fn next(now: i64, limit: u32) -> Self {
        Self::future(now)
            .order_by_date(SortOrder::Ascending)
            .limit(limit)
    }

    /// `next` with [`DEFAULT_NEXT_LIMIT`].
    pub fn next_default(now: i64) -> Self {
        Self::next(now, DEFAULT_NEXT_LIMIT)
    }

    /// Special events among the five soonest future events.
    pub fn next_five_special(now: i64) -> Self {
        Self::next(now, 5).special()
    }

    /// Recurring events among the four soonest future events.
    pub fn next_four_recurring(now: i64) -> Self {
        Self::next(now, 4).recurring()
    }

    pub fn recurring(self) -> Self {
        self.category(Recurrence::Recurring)
    }

    pub fn special(self) -> Self {
        self.category(Recurrence::Special)
    }

    pub fn after(self, now: i64) -> Self {
        self.push(ScopeStep::After(now))
    }

    pub fn at_or_before(self, now: i64) -> Self {
        self.push(ScopeStep::AtOrBefore(now))
    }

    pub fn order_by_date(self, order: SortOrder) -> Self {
        self.push(ScopeStep::OrderByDate(order))
    }

    pub fn limit(self, limit: u32) -> Self {
        self.push(ScopeStep::Limit(limit))
    }

    pub fn category(self, recurrence: Recurrence) -> Self {
        self.push(ScopeStep::Category(recurrence))
    }

    /// Applies a named scope function, e.g. `query.chain(EventQuery::special)`.
    pub fn chain(self, scope: impl FnOnce(Self) -> Self) -> Self {
        scope(self)
    }

    /// Returns recorded steps in application order.
    pub fn steps(&self) -> &[ScopeStep] {
        &self.steps
    }

    /// Evaluates this query over `events`.
    ///
    /// Input order is kept until the first ordering step.
    pub fn apply(&self, events: &[Event]) -> Vec<Event> {
        let mut rows = events.to_vec();

        for step in &self.steps {
            match *step {
                ScopeStep::After(now) => rows.retain(|event| event.is_after(now)),
                ScopeStep::AtOrBefore(now) => {
                    rows.retain(|event| event.date.is_some_and(|date| date <= now))
                }
                ScopeStep::OrderByDate(SortOrder::Ascending) => {
                    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)))
                }
                ScopeStep::OrderByDate(SortOrder::Descending) => {
                    rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)))
                }
                ScopeStep::Limit(limit) => rows.truncate(limit as usize),
                ScopeStep::Category(recurrence) => {
                    rows.retain(|event| event.recurrence == recurrence)
                }
            }
        }

        rows
    }

    fn push(mut self, step: ScopeStep) -> Self {
        self.steps.push(step);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{EventQuery, ScopeStep, SortOrder};
    use crate::model::event::{Event, Recurrence};

    const NOW: i64 = 1_700_000_000_000;
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn event(title: &str, offset_days: i64, recurrence: Recurrence) -> Event {
        Event::new(title, NOW + offset_days * DAY_MS, "Boston, MA").with_recurrence(recurrence)
    }

    fn titles(events: &[Event]) -> Vec<&str> {
        events.iter().map(|event| event.title.as_str()).collect()
    }

    #[test]
    fn next_five_special_limits_before_filtering() {
        let query = EventQuery::next_five_special(NOW);
        assert_eq!(
            query.steps(),
            &[
                ScopeStep::After(NOW),
                ScopeStep::OrderByDate(SortOrder::Ascending),
                ScopeStep::Limit(5),
                ScopeStep::Category(Recurrence::Special),
            ]
        );
    }

    #[test]
    fn chain_applies_named_scope_functions() {
        let chained = EventQuery::next(NOW, 4).chain(EventQuery::recurring);
        assert_eq!(chained, EventQuery::next_four_recurring(NOW));
    }

    #[test]
    fn future_is_strictly_after_now() {
        let mut at_now = event("now", 0, Recurrence::Special);
        at_now.date = Some(NOW);
        let events = vec![
            at_now,
            event("tomorrow", 1, Recurrence::Special),
            event("yesterday", -1, Recurrence::Recurring),
        ];

        let future = EventQuery::future(NOW).apply(&events);
        assert_eq!(titles(&future), vec!["tomorrow"]);

        let past = EventQuery::past(NOW).apply(&events);
        assert_eq!(titles(&past), vec!["now", "yesterday"]);
    }

    #[test]
    fn filter_after_limit_sees_only_limited_rows() {
        let mut events = (1..=5)
            .map(|day| event(&format!("weekly {day}"), day, Recurrence::Recurring))
            .collect::<Vec<_>>();
        events.push(event("gala", 6, Recurrence::Special));

        assert!(EventQuery::next_five_special(NOW).apply(&events).is_empty());

        let filter_first = EventQuery::future(NOW)
            .special()
            .order_by_date(SortOrder::Ascending)
            .limit(5)
            .apply(&events);
        assert_eq!(titles(&filter_first), vec!["gala"]);
    }
}
