//! People-you-may-know and place ranking over a small in-memory graph.
//!
//! Run with: cargo run --example discover_and_recommend

use std::collections::HashMap;

use futures::future::{BoxFuture, FutureExt};
use nearby_engine::error::CollaboratorResult;
use nearby_engine::recommend::RecommendContext;
use nearby_engine::{
    find_clusters, geo_utils, rank_suggestions, recommend_places, ActiveUser, GpsPoint,
    PlaceCandidate, ProximityConfig, RecommendConfig, UserDirectory, UserGeohash, UserRecord,
    WeightAdjustment, WeightConfig,
};

struct Directory {
    users: HashMap<String, UserRecord>,
}

impl Directory {
    fn new(edges: &[(&str, &str)]) -> Self {
        let mut users: HashMap<String, UserRecord> = HashMap::new();
        for (a, b) in edges {
            for (x, y) in [(a, b), (b, a)] {
                users
                    .entry(x.to_string())
                    .or_insert_with(|| UserRecord::new(*x, capitalize(x), ""))
                    .friends
                    .insert(y.to_string());
            }
        }
        Self { users }
    }
}

impl UserDirectory for Directory {
    fn fetch_user<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<Option<UserRecord>>> {
        async move { Ok(self.users.get(id).cloned()) }.boxed()
    }

    fn fetch_pair_closeness<'a>(
        &'a self,
        a: &'a str,
        b: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<f64>> {
        // Pretend alphabetically adjacent names message each other more
        let initial = |s: &str| f64::from(s.bytes().next().unwrap_or(0));
        let cost = (initial(a) - initial(b)).abs() / 10.0 + 0.1;
        async move { Ok(cost) }.boxed()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[tokio::main]
async fn main() {
    let directory = Directory::new(&[
        ("alice", "bob"),
        ("alice", "carol"),
        ("bob", "dave"),
        ("carol", "dave"),
        ("carol", "erin"),
        ("erin", "frank"),
    ]);

    println!("People Alice may know\n");
    match nearby_engine::discover(&directory, "alice", None).await {
        Ok(found) => {
            for suggestion in rank_suggestions(found) {
                let path: Vec<&str> = suggestion
                    .friend_path
                    .iter()
                    .map(|n| n.user_name.as_str())
                    .collect();
                println!(
                    "  {:<6} degree {:.2} via {}",
                    suggestion.data.full_name(),
                    suggestion.degree,
                    path.join(" -> ")
                );
            }
        }
        Err(e) => println!("  discovery failed: {}", e),
    }

    let tower = GpsPoint::new(48.85837, 2.294481);
    let tower_hash = geo_utils::encode_geohash(&tower, 9).unwrap_or_default();
    let locations = vec![
        UserGeohash::new("bob", tower_hash.clone()),
        UserGeohash::new("dave", tower_hash.clone()),
        UserGeohash::new("frank", "u09whv25s"),
    ];

    println!("\nClusters of active users");
    for cluster in find_clusters(&locations, &ProximityConfig::default()) {
        println!("  {} -> {:?}", cluster.geohash, cluster.user_ids);
    }

    let active: Vec<ActiveUser> = locations
        .iter()
        .filter_map(|l| {
            let user = directory.users.get(&l.user_id)?.clone();
            Some(ActiveUser { user, geohash: l.geohash.clone() })
        })
        .collect();
    let Some(alice) = directory.users.get("alice") else {
        return;
    };
    let weights = WeightConfig::default();
    let adjustment = WeightAdjustment::default();
    let ctx = RecommendContext {
        user: alice,
        user_geohash: "u09tunq6q",
        active_users: &active,
        visits: &[],
        weights: &weights,
        adjustment: &adjustment,
        now: 1_700_000_000,
    };
    let candidates = vec![
        PlaceCandidate {
            id: "tower".into(),
            display_name: "Eiffel Tower".into(),
            address: "Champ de Mars".into(),
            primary_type: "landmark".into(),
            location: tower,
        },
        PlaceCandidate {
            id: "louvre".into(),
            display_name: "Louvre".into(),
            address: "Rue de Rivoli".into(),
            primary_type: "museum".into(),
            location: GpsPoint::new(48.8606, 2.3376),
        },
    ];

    println!("\nPlaces for Alice");
    let set = recommend_places(&candidates, &ctx, &RecommendConfig::default());
    for rec in &set.recommendations {
        println!(
            "  {:<14} score {:>6.2}  ({} here, {} friends, prefix {})",
            rec.place.display_name,
            rec.score,
            rec.user_data.count,
            rec.user_data.friend_count,
            rec.geohash_distance
        );
    }
}
