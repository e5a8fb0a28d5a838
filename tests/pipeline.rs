mod common;

use assert_approx_eq::assert_approx_eq;

use nhl_features::blend::FeatureRow;
use nhl_features::error::FeatureError;
use nhl_features::game::{FranchiseId, Side};
use nhl_features::pipeline::{build_season_features, matchup_features, run_pipeline};
use nhl_features::prior_rates::RateStat;
use nhl_features::store::{GameStore, MemoryStore};

use common::{T1, T2, T3, config, current_season, game, prior_season};

fn store() -> MemoryStore {
    MemoryStore::with_games(prior_season().into_iter().chain(current_season()))
}

fn rows(store: &MemoryStore) -> Vec<FeatureRow> {
    store.fetch_feature_rows(&[2015]).unwrap()
}

#[test]
fn goals_for_follows_the_worked_example() {
    let mut store = store();
    let report = run_pipeline(&mut store, &config());
    assert!(report.all_succeeded(), "{:?}", report.outcomes);

    let rows = rows(&store);
    assert_eq!(rows.len(), 3);
    assert_approx_eq!(rows[0].rate(RateStat::GoalsFor, Side::Home), 2.5);
    assert_approx_eq!(rows[1].rate(RateStat::GoalsFor, Side::Away), 27.0 / 11.0);
    assert_approx_eq!(rows[2].rate(RateStat::GoalsFor, Side::Home), 31.0 / 12.0);
    assert_approx_eq!(rows[2].rate(RateStat::Wins, Side::Home), 7.0 / 12.0);
    assert_approx_eq!(rows[2].rate(RateStat::GoalsFor, Side::Away), 26.0 / 11.0);
    assert!(rows[0].home_win);
    assert!(!rows[2].home_win);
}

#[test]
fn first_game_features_equal_prior_rates() {
    let mut store = store();
    run_pipeline(&mut store, &config());
    let first = &rows(&store)[0];
    assert_approx_eq!(first.rate(RateStat::ShotsFor, Side::Home), 31.0);
    assert_approx_eq!(first.rate(RateStat::ShotsAgainst, Side::Home), 26.5);
    assert_approx_eq!(first.rate(RateStat::ShotsFor, Side::Away), 26.5);
    assert_approx_eq!(first.rate(RateStat::Wins, Side::Away), 0.5);
}

#[test]
fn away_shots_use_the_away_teams_own_shots() {
    let mut store = store();
    run_pipeline(&mut store, &config());
    let second = &rows(&store)[1];
    assert_approx_eq!(second.rate(RateStat::ShotsFor, Side::Away), 343.0 / 11.0);
    assert_approx_eq!(second.rate(RateStat::ShotsAgainst, Side::Away), 285.0 / 11.0);
}

#[test]
fn new_team_gets_league_average_prior() {
    let mut store = store();
    let report = run_pipeline(&mut store, &config());
    let season = report.outcomes.iter().find(|o| o.season == 2015).unwrap();
    assert_eq!(season.imputed_teams, vec![T3]);

    let second = &rows(&store)[1];
    assert_eq!(second.home_team_id, T3);
    assert_approx_eq!(second.rate(RateStat::GoalsFor, Side::Home), 2.5);
    assert_approx_eq!(second.rate(RateStat::ShotsFor, Side::Home), 28.75);
    assert_approx_eq!(second.rate(RateStat::ShotsAgainst, Side::Home), 28.75);
    assert_approx_eq!(second.rate(RateStat::Wins, Side::Home), 0.5);
}

#[test]
fn rerun_changes_nothing() {
    let mut store = store();
    run_pipeline(&mut store, &config());
    let first = rows(&store);
    let states = store.team_state_count();

    let report = run_pipeline(&mut store, &config());
    let season = report.outcomes.iter().find(|o| o.season == 2015).unwrap();
    assert_eq!(season.features_written, 0);
    assert_eq!(season.features_skipped, 3);
    assert_eq!(rows(&store), first);
    assert_eq!(store.team_state_count(), states);
    assert_eq!(store.feature_count(), 3);
}

#[test]
fn later_games_do_not_change_earlier_features() {
    let mut store = store();
    run_pipeline(&mut store, &config());
    let baseline = rows(&store);

    let mut changed: Vec<_> = current_season();
    changed[2] = game("2015020003", 2015, 11, (T1, T2), (9, 0), (50, 10));
    let mut other = MemoryStore::with_games(prior_season().into_iter().chain(changed));
    run_pipeline(&mut other, &config());
    let altered = rows(&other);

    assert_eq!(altered[0], baseline[0]);
    assert_eq!(altered[1], baseline[1]);
    assert_eq!(altered[2].rate(RateStat::GoalsFor, Side::Home), baseline[2].rate(RateStat::GoalsFor, Side::Home));
    assert_ne!(altered[2].home_win, baseline[2].home_win);
}

#[test]
fn failed_season_resumes_on_next_run() {
    let mut store = store();
    store.fail_writes_for(Some(2015));
    let report = run_pipeline(&mut store, &config());
    assert!(!report.all_succeeded());
    let failed: Vec<i32> = report.failed().map(|o| o.season).collect();
    assert_eq!(failed, vec![2015]);
    assert_eq!(store.feature_count(), 0);
    assert_eq!(store.runs().len(), 2);

    store.fail_writes_for(None);
    let report = run_pipeline(&mut store, &config());
    assert!(report.all_succeeded());

    let mut fresh = self::store();
    run_pipeline(&mut fresh, &config());
    assert_eq!(rows(&store), rows(&fresh));
}

#[test]
fn late_game_only_adds_its_own_row() {
    let mut games = current_season();
    let late = games.pop().unwrap();
    let mut store = MemoryStore::with_games(prior_season().into_iter().chain(games));
    run_pipeline(&mut store, &config());
    let before = rows(&store);
    assert_eq!(before.len(), 2);

    store.upsert_games(&[late]).unwrap();
    let report = run_pipeline(&mut store, &config());
    let season = report.outcomes.iter().find(|o| o.season == 2015).unwrap();
    assert_eq!(season.features_written, 1);
    assert_eq!(season.features_skipped, 2);

    let mut fresh = self::store();
    run_pipeline(&mut fresh, &config());
    assert_eq!(rows(&store), rows(&fresh));
}

#[test]
fn first_season_has_nothing_to_impute_from() {
    let mut store = store();
    let mut config = config();
    config.feature_seasons = vec![2014];
    let report = run_pipeline(&mut store, &config);
    let season = report.outcomes.iter().find(|o| o.season == 2014).unwrap();
    assert!(season.error.as_deref().unwrap_or_default().contains("no team has prior-season data"));

    let err = build_season_features(&mut store, 2014, 10).unwrap_err();
    assert!(matches!(err, FeatureError::EmptyLeagueImputation { season: 2014 }));
}

#[test]
fn matchup_blends_latest_totals() {
    let mut store = store();
    run_pipeline(&mut store, &config());

    let features = matchup_features(&store, 2015, T1, T3, 10).unwrap();
    assert_eq!(features.home_games_played, 3);
    assert_eq!(features.away_games_played, 1);
    assert_approx_eq!(features.home.get(RateStat::GoalsFor), 34.0 / 13.0);
    assert_approx_eq!(features.away.get(RateStat::GoalsFor), 27.0 / 11.0);
    assert_approx_eq!(features.away.get(RateStat::Wins), 5.0 / 11.0);

    let unseen = matchup_features(&store, 2015, FranchiseId(40), T2, 10).unwrap();
    assert_eq!(unseen.home_games_played, 0);
    assert_approx_eq!(unseen.home.get(RateStat::GoalsFor), 2.5);
    assert_approx_eq!(unseen.home.get(RateStat::ShotsFor), 28.75);
}

#[test]
fn matchup_before_opening_night_imputes_from_last_seasons_league() {
    let mut store = MemoryStore::with_games(prior_season());
    let mut config = config();
    config.seasons = vec![2014];
    config.feature_seasons = Vec::new();
    assert!(run_pipeline(&mut store, &config).all_succeeded());
    assert!(store.fetch_season_team_states(2015).unwrap().is_empty());

    let features = matchup_features(&store, 2015, T3, T1, 10).unwrap();
    assert_eq!(features.home_games_played, 0);
    assert_eq!(features.away_games_played, 0);
    assert_approx_eq!(features.home.get(RateStat::ShotsFor), 28.75);
    assert_approx_eq!(features.home.get(RateStat::ShotsAgainst), 28.75);
    assert_approx_eq!(features.away.get(RateStat::ShotsFor), 31.0);
}
