//! Reducing multi-provider observations to the requested answer shape.

use rust_decimal::Decimal;
use spotrate_common::{mean_timestamp, Currency, RateType};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::error::{FxError, FxResult};
use crate::observation::RateObservation;
use crate::policy::AggregationPolicy;

type GroupKey = (Currency, Currency, RateType);

/// Combine observations per `(pair, rate_type)` according to `policy`.
///
/// Groups come back sorted by pair then rate type. An empty input is
/// [`FxError::NoRatesFound`].
pub fn aggregate(
    observations: Vec<RateObservation>,
    policy: &AggregationPolicy,
) -> FxResult<Vec<RateObservation>> {
    if observations.is_empty() {
        return Err(FxError::NoRatesFound);
    }

    let mut groups: BTreeMap<GroupKey, Vec<RateObservation>> = BTreeMap::new();
    for obs in observations {
        let key = (
            obs.from_currency.clone(),
            obs.to_currency.clone(),
            obs.rate_type.clone(),
        );
        groups.entry(key).or_default().push(obs);
    }

    let mut out = Vec::with_capacity(groups.len());
    for group in groups.into_values() {
        match policy {
            AggregationPolicy::AnySource | AggregationPolicy::SpecificSource(_) => {
                out.extend(group.into_iter().next());
            }
            AggregationPolicy::AllSources => {
                let mut group = group;
                group.sort_by(|a, b| a.source_str().cmp(b.source_str()));
                out.extend(group);
            }
            AggregationPolicy::Highest => out.extend(select(group, policy, |c, best| c.rate > best.rate)),
            AggregationPolicy::Lowest => out.extend(select(group, policy, |c, best| c.rate < best.rate)),
            AggregationPolicy::Newest => out.extend(select(group, policy, newer)),
            AggregationPolicy::Oldest => out.extend(select(group, policy, |c, best| newer(best, c))),
            AggregationPolicy::Average => out.extend(average(group)),
        }
    }

    if out.is_empty() {
        return Err(FxError::NoRatesFound);
    }
    Ok(out)
}

/// Whether `a` has a later `source_mtime` than `b`. Missing mtimes lose to any present one.
fn newer(a: &RateObservation, b: &RateObservation) -> bool {
    match (a.source_mtime, b.source_mtime) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Sorted distinct sources contributing to a group.
fn sources_of(group: &[RateObservation]) -> BTreeSet<&str> {
    group.iter().filter_map(|o| o.source.as_deref()).collect()
}

/// Pick the first observation no other member beats; annotate multi-source picks.
fn select<F>(
    group: Vec<RateObservation>,
    policy: &AggregationPolicy,
    beats: F,
) -> Option<RateObservation>
where
    F: Fn(&RateObservation, &RateObservation) -> bool,
{
    let sources: Vec<String> = sources_of(&group).into_iter().map(str::to_string).collect();
    let oldest = matches!(policy, AggregationPolicy::Oldest);

    let mut best = group.into_iter().reduce(|best, candidate| {
        // For oldest, a missing mtime never wins over a present one.
        let wins = if oldest {
            candidate.source_mtime.is_some()
                && (best.source_mtime.is_none() || beats(&candidate, &best))
        } else {
            beats(&candidate, &best)
        };
        if wins {
            candidate
        } else {
            best
        }
    })?;

    if sources.len() > 1 {
        let summary = format!("{} of {}", policy.label(), sources.join(", "));
        best.note = Some(match best.note.take() {
            Some(note) if !note.is_empty() => format!("{note}; {summary}"),
            _ => summary,
        });
    }
    Some(best)
}

/// Mean rate and mean mtime over the latest observation of each source.
///
/// A group whose rates overflow when summed yields nothing.
fn average(group: Vec<RateObservation>) -> Option<RateObservation> {
    let mut seen = BTreeSet::new();
    let members: Vec<RateObservation> = group
        .into_iter()
        .filter(|o| seen.insert(o.source.clone()))
        .collect();

    let (first, rest) = members.split_first()?;
    if rest.is_empty() {
        return Some(first.clone());
    }

    let sources: Vec<String> = sources_of(&members).into_iter().map(str::to_string).collect();
    let Some(total) = members
        .iter()
        .try_fold(Decimal::ZERO, |sum, o| sum.checked_add(o.rate))
    else {
        warn!(pair = %first.pair(), "Rates too large to average, dropping group");
        return None;
    };
    let mtimes: Vec<_> = members.iter().filter_map(|o| o.source_mtime).collect();

    let mut result = first.clone();
    result.rate = total / Decimal::from(members.len());
    result.source_mtime = mean_timestamp(&mtimes);
    result.query_time = members.iter().map(|o| o.query_time).max().unwrap_or(first.query_time);
    result.source = None;
    result.note = Some(format!("(average of {})", sources.join(", ")));
    Some(result)
}
