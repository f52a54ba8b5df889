use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution};
use tracing::info;
use uuid::Uuid;

use precog_common::{Citizen, CitizenStatus, Frequency, Location, HIGH_RISK_SEED};

use crate::writer::{CrimeSeed, GraphWriter};
use crate::GraphClient;

/// Base probability that any sampled candidate pair connects.
const BASE_CONNECT_PROB: f64 = 0.1;
/// Added when both endpoints carry a high risk_seed. This is the injected
/// homophily signal the scoring model is supposed to rediscover.
const HOMOPHILY_BONUS: f64 = 0.5;
/// Added when two ids fall within the neighborhood window below.
const PROXIMITY_BONUS: f64 = 0.2;
/// Id distance treated as "same neighborhood".
const PROXIMITY_WINDOW: i64 = 20;
/// How many candidate friends each citizen draws from the population.
const CANDIDATE_SAMPLE: usize = 50;

const LOCATION_TYPES: [&str; 10] = [
    "Bank",
    "Jewelry Store",
    "Subway Station",
    "Dark Alley",
    "Park",
    "Cafe",
    "Apartment Block",
    "Shopping Mall",
    "Gas Station",
    "Warehouse",
];

const FIRST_NAMES: [&str; 20] = [
    "John", "Sarah", "Miguel", "Aisha", "Wei", "Elena", "Darnell", "Priya", "Tomasz", "Ingrid",
    "Omar", "Lucia", "Kenji", "Fatima", "Viktor", "Naomi", "Andre", "Rosa", "Dmitri", "Amara",
];

const LAST_NAMES: [&str; 20] = [
    "Anderton", "Marks", "Witwer", "Lively", "Hineman", "Burgess", "Chen", "Okafor", "Silva",
    "Novak", "Haddad", "Kowalski", "Tanaka", "Reyes", "Petrov", "Osei", "Lindqvist", "Moreau",
    "Vargas", "Ito",
];

const STREET_NAMES: [&str; 12] = [
    "Mulberry", "Crestview", "Harbor", "Lexington", "Birchwood", "Monument", "Fulton", "Granite",
    "Willow", "Sycamore", "Carver", "Halcyon",
];

const JOBS: [&str; 13] = [
    "Doctor", "Engineer", "Teacher", "Police Officer", "Artist", "Driver", "Clerk", "Manager",
    "Scientist", "Chef", "Electrician", "Journalist", "Librarian",
];

/// Knobs for one generation run.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub num_citizens: usize,
    pub num_locations: usize,
    pub node_batch_size: usize,
    pub edge_batch_size: usize,
    /// Fixed seed makes the whole run reproducible.
    pub seed: Option<u64>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            num_citizens: 1000,
            num_locations: 50,
            node_batch_size: 500,
            edge_batch_size: 1000,
            seed: None,
        }
    }
}

/// Aggregate counts reported after a generation run.
#[derive(Debug, Clone, Default)]
pub struct CityStats {
    pub citizens: i64,
    pub locations: i64,
    pub social_links: i64,
    pub routines: i64,
    pub crimes: i64,
    pub unique_criminals: i64,
    pub network_density: f64,
}

/// Generates a synthetic city into the graph: locations, citizens with a
/// hidden risk seed, a homophily-biased social graph, routines, and
/// risk-conditioned historical crimes. A write failure aborts the run;
/// callers regenerate from scratch rather than patching.
pub struct CitySynthesizer {
    client: GraphClient,
    writer: GraphWriter,
    config: SynthesisConfig,
    rng: StdRng,
}

impl CitySynthesizer {
    pub fn new(client: GraphClient, config: SynthesisConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let writer = GraphWriter::new(client.clone());
        Self { client, writer, config, rng }
    }

    /// Run the full pipeline: clear, then locations → citizens → social
    /// graph → routines → crimes, batched throughout.
    pub async fn generate(&mut self) -> Result<CityStats, neo4rs::Error> {
        self.writer.ensure_constraints().await?;
        self.writer.clear_city().await?;

        let locations = synth_locations(&mut self.rng, self.config.num_locations);
        self.writer
            .insert_locations(&locations, self.config.node_batch_size)
            .await?;

        let citizens = synth_citizens(&mut self.rng, self.config.num_citizens);
        self.writer
            .insert_citizens(&citizens, self.config.node_batch_size)
            .await?;

        let knows = synth_social_graph(&mut self.rng, &citizens);
        self.writer
            .insert_knows(&knows, self.config.edge_batch_size)
            .await?;

        let visits = synth_routines(&mut self.rng, &citizens, &locations);
        self.writer
            .insert_visits(&visits, self.config.edge_batch_size)
            .await?;

        let crimes = synth_crimes(&mut self.rng, &citizens, &locations);
        self.writer
            .insert_crimes(&crimes, self.config.node_batch_size)
            .await?;

        let stats = self.stats().await?;
        info!(
            citizens = stats.citizens,
            locations = stats.locations,
            social_links = stats.social_links,
            crimes = stats.crimes,
            unique_criminals = stats.unique_criminals,
            "City generated"
        );
        Ok(stats)
    }

    /// Count what actually landed in the graph.
    pub async fn stats(&self) -> Result<CityStats, neo4rs::Error> {
        let citizens = self.client.count("MATCH (c:Citizen) RETURN count(c) AS n").await?;
        let locations = self.client.count("MATCH (l:Location) RETURN count(l) AS n").await?;
        let social_links = self
            .client
            .count("MATCH ()-[:KNOWS]->() RETURN count(*) AS n")
            .await?;
        let routines = self
            .client
            .count("MATCH ()-[:VISITS]->() RETURN count(*) AS n")
            .await?;
        let crimes = self.client.count("MATCH (cr:Crime) RETURN count(cr) AS n").await?;
        let unique_criminals = self
            .client
            .count("MATCH (c:Citizen)-[:PERPETRATOR_OF]->() RETURN count(DISTINCT c) AS n")
            .await?;

        let network_density = if citizens > 1 {
            social_links as f64 / (citizens as f64 * (citizens as f64 - 1.0))
        } else {
            0.0
        };

        Ok(CityStats {
            citizens,
            locations,
            social_links,
            routines,
            crimes,
            unique_criminals,
            network_density,
        })
    }
}

// --- Generation passes (pure given the RNG) ---

fn synth_locations(rng: &mut StdRng, count: usize) -> Vec<Location> {
    (0..count)
        .map(|i| {
            let loc_type = *LOCATION_TYPES.choose(rng).unwrap();
            let street = *STREET_NAMES.choose(rng).unwrap();
            Location {
                id: format!("LOC_{i}"),
                name: format!("{street} St {loc_type}"),
                loc_type: loc_type.to_string(),
                env_risk: env_risk_for(loc_type),
                lat: 40.0 + rng.random::<f64>() * 0.5,
                lng: -74.0 + rng.random::<f64>() * 0.5,
            }
        })
        .collect()
}

fn synth_citizens(rng: &mut StdRng, count: usize) -> Vec<Citizen> {
    // Beta(2,10) skews the population toward low risk; the tail is the small
    // criminal minority.
    let beta = Beta::new(2.0, 10.0).expect("valid beta parameters");
    (0..count as i64)
        .map(|id| {
            let first = *FIRST_NAMES.choose(rng).unwrap();
            let last = *LAST_NAMES.choose(rng).unwrap();
            let street = *STREET_NAMES.choose(rng).unwrap();
            Citizen {
                id,
                name: format!("{first} {last}"),
                born: rng.random_range(1940..=2007),
                job: JOBS.choose(rng).unwrap().to_string(),
                address: format!("{} {street} St", rng.random_range(1..1999)),
                status: CitizenStatus::Active,
                risk_seed: beta.sample(rng),
            }
        })
        .collect()
}

/// Draw the KNOWS edges. Each candidate pair is an independent Bernoulli
/// draw, and the edge is directional: the reverse direction is a separate
/// draw, never deduplicated.
fn synth_social_graph(rng: &mut StdRng, citizens: &[Citizen]) -> Vec<(i64, i64, i64)> {
    let pool: Vec<(i64, f64)> = citizens.iter().map(|c| (c.id, c.risk_seed)).collect();
    let mut edges = Vec::new();

    for person in citizens {
        let candidates: Vec<&(i64, f64)> = pool
            .choose_multiple(rng, CANDIDATE_SAMPLE.min(pool.len()))
            .collect();

        for (friend_id, friend_risk) in candidates {
            if person.id == *friend_id {
                continue;
            }
            let prob =
                connection_probability(person.risk_seed, *friend_risk, person.id, *friend_id);
            if rng.random::<f64>() < prob {
                let since = rng.random_range(2015..=2025);
                edges.push((person.id, *friend_id, since));
            }
        }
    }
    edges
}

fn synth_routines(
    rng: &mut StdRng,
    citizens: &[Citizen],
    locations: &[Location],
) -> Vec<(i64, String, Frequency)> {
    let mut visits = Vec::new();
    for citizen in citizens {
        let num_places = rng.random_range(3..=7).min(locations.len());
        for place in locations.choose_multiple(rng, num_places) {
            let frequency = match place.loc_type.as_str() {
                "Cafe" | "Park" => Frequency::Daily,
                _ => Frequency::Weekly,
            };
            visits.push((citizen.id, place.id.clone(), frequency));
        }
    }
    visits
}

/// Ground truth: only citizens above the risk threshold ever offend, and the
/// worse the seed, the more crimes they stack up.
fn synth_crimes(rng: &mut StdRng, citizens: &[Citizen], locations: &[Location]) -> Vec<CrimeSeed> {
    // A city without locations has nowhere for a crime to happen.
    if locations.is_empty() {
        return Vec::new();
    }
    let any_target: Vec<&Location> = locations.iter().collect();
    let high_value: Vec<&Location> = locations.iter().filter(|l| l.env_risk > 0.5).collect();
    let targets = if high_value.is_empty() { &any_target } else { &high_value };

    let today = Utc::now().date_naive();
    let mut crimes = Vec::new();

    for offender in citizens.iter().filter(|c| c.risk_seed > HIGH_RISK_SEED) {
        let max_crimes = ((offender.risk_seed * 10.0).round() as i64).max(1);
        let num_crimes = rng.random_range(1..=max_crimes);

        for _ in 0..num_crimes {
            let target = *targets.choose(rng).unwrap();
            let (crime_type, severity) = crime_for_location(rng, &target.loc_type);
            let date = today - Duration::days(rng.random_range(0..730));
            crimes.push(CrimeSeed {
                id: Uuid::new_v4(),
                citizen_id: offender.id,
                location_id: target.id.clone(),
                crime_type: crime_type.to_string(),
                severity,
                date: date.format("%Y-%m-%d").to_string(),
                description: format!("{crime_type} reported at {}", target.name),
            });
        }
    }
    crimes
}

/// Crime type and severity follow the location type.
fn crime_for_location(rng: &mut StdRng, loc_type: &str) -> (&'static str, i64) {
    match loc_type {
        "Bank" => ("Robbery", rng.random_range(7..=10)),
        "Jewelry Store" => ("Robbery", rng.random_range(6..=9)),
        "Dark Alley" => ("Assault", rng.random_range(4..=8)),
        "Park" => ("Vandalism", rng.random_range(2..=5)),
        _ => {
            let crime_type = *["Theft", "Assault", "Vandalism"].choose(rng).unwrap();
            (crime_type, rng.random_range(3..=7))
        }
    }
}

fn env_risk_for(loc_type: &str) -> f64 {
    match loc_type {
        // Poorly watched spaces
        "Dark Alley" | "Warehouse" => 0.9,
        // High-value targets
        "Bank" | "Jewelry Store" => 0.7,
        _ => 0.1,
    }
}

fn connection_probability(risk_a: f64, risk_b: f64, id_a: i64, id_b: i64) -> f64 {
    let mut prob = BASE_CONNECT_PROB;
    if risk_a > HIGH_RISK_SEED && risk_b > HIGH_RISK_SEED {
        prob += HOMOPHILY_BONUS;
    }
    if (id_a - id_b).abs() < PROXIMITY_WINDOW {
        prob += PROXIMITY_BONUS;
    }
    prob
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_risk_buckets_match_location_class() {
        assert_eq!(env_risk_for("Dark Alley"), 0.9);
        assert_eq!(env_risk_for("Warehouse"), 0.9);
        assert_eq!(env_risk_for("Bank"), 0.7);
        assert_eq!(env_risk_for("Jewelry Store"), 0.7);
        assert_eq!(env_risk_for("Cafe"), 0.1);
    }

    #[test]
    fn homophily_bonus_requires_both_endpoints_high_risk() {
        // Far-apart ids keep the proximity bonus out of the picture.
        let base = connection_probability(0.2, 0.3, 0, 500);
        let one_sided = connection_probability(0.9, 0.3, 0, 500);
        let both = connection_probability(0.9, 0.8, 0, 500);
        assert!((base - 0.1).abs() < 1e-12);
        assert!((one_sided - 0.1).abs() < 1e-12);
        assert!((both - 0.6).abs() < 1e-12);
    }

    #[test]
    fn proximity_bonus_applies_within_window() {
        let near = connection_probability(0.1, 0.1, 10, 25);
        let far = connection_probability(0.1, 0.1, 10, 30);
        assert!((near - 0.3).abs() < 1e-12);
        assert!((far - 0.1).abs() < 1e-12);
    }

    #[test]
    fn risk_seeds_stay_in_unit_interval_and_skew_low() {
        let mut rng = StdRng::seed_from_u64(7);
        let citizens = synth_citizens(&mut rng, 5000);
        assert!(citizens.iter().all(|c| (0.0..=1.0).contains(&c.risk_seed)));
        let mean = citizens.iter().map(|c| c.risk_seed).sum::<f64>() / citizens.len() as f64;
        // Beta(2,10) mean is 2/12.
        assert!((mean - 1.0 / 6.0).abs() < 0.02, "mean was {mean}");
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let ca = synth_citizens(&mut a, 25);
        let cb = synth_citizens(&mut b, 25);
        for (x, y) in ca.iter().zip(cb.iter()) {
            assert_eq!(x.name, y.name);
            assert_eq!(x.born, y.born);
            assert!((x.risk_seed - y.risk_seed).abs() < 1e-15);
        }
        let ea = synth_social_graph(&mut a, &ca);
        let eb = synth_social_graph(&mut b, &cb);
        assert_eq!(ea, eb);
    }

    #[test]
    fn crimes_only_come_from_high_risk_citizens() {
        let mut rng = StdRng::seed_from_u64(9);
        let citizens = synth_citizens(&mut rng, 200);
        let locations = synth_locations(&mut rng, 10);
        let crimes = synth_crimes(&mut rng, &citizens, &locations);

        for crime in &crimes {
            let offender = citizens
                .iter()
                .find(|c| c.id == crime.citizen_id)
                .expect("crime references a generated citizen");
            assert!(offender.risk_seed > HIGH_RISK_SEED);
            assert!((1..=10).contains(&crime.severity));
        }
    }

    #[test]
    fn a_city_without_locations_yields_no_crimes() {
        let mut rng = StdRng::seed_from_u64(5);
        let offender = Citizen {
            id: 0,
            name: "Leo Crow".to_string(),
            born: 1970,
            job: "Driver".to_string(),
            address: "1 Mulberry St".to_string(),
            status: CitizenStatus::Active,
            risk_seed: 0.95,
        };
        let crimes = synth_crimes(&mut rng, &[offender], &[]);
        assert!(crimes.is_empty());
    }

    #[test]
    fn crime_lookup_respects_severity_ranges() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert!((7..=10).contains(&crime_for_location(&mut rng, "Bank").1));
            assert!((6..=9).contains(&crime_for_location(&mut rng, "Jewelry Store").1));
            assert!((4..=8).contains(&crime_for_location(&mut rng, "Dark Alley").1));
            assert!((2..=5).contains(&crime_for_location(&mut rng, "Park").1));
            assert!((3..=7).contains(&crime_for_location(&mut rng, "Cafe").1));
        }
        assert_eq!(crime_for_location(&mut rng, "Bank").0, "Robbery");
        assert_eq!(crime_for_location(&mut rng, "Park").0, "Vandalism");
    }

    #[test]
    fn routines_visit_three_to_seven_distinct_places() {
        let mut rng = StdRng::seed_from_u64(11);
        let citizens = synth_citizens(&mut rng, 30);
        let locations = synth_locations(&mut rng, 20);
        let visits = synth_routines(&mut rng, &citizens, &locations);

        for citizen in &citizens {
            let mine: Vec<&String> = visits
                .iter()
                .filter(|(cid, _, _)| *cid == citizen.id)
                .map(|(_, lid, _)| lid)
                .collect();
            assert!((3..=7).contains(&mine.len()), "visits = {}", mine.len());
            let mut dedup = mine.clone();
            dedup.sort();
            dedup.dedup();
            assert_eq!(dedup.len(), mine.len(), "duplicate VISITS for one citizen");
        }
    }
}
