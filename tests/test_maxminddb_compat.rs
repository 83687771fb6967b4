// Databases written here must be readable by an independent MMDB reader.

use geoforge::{ingest, DataValue, IpVersion, RecordSize, Trie, TrieOptions};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;

#[derive(Debug, Deserialize, PartialEq)]
struct Country {
    iso_code: String,
    name: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Location {
    latitude: f32,
    longitude: f32,
    time_zone: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Subdivision {
    iso_code: String,
    category: String,
}

#[derive(Debug, Deserialize)]
struct City {
    country: Country,
    location: Location,
    #[serde(default)]
    subdivisions: Vec<Subdivision>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

const LINES: &[&str] = &[
    r#"{"protocol":4,"network":"1.0.0.0/24","location":{"continent":{"code":"OC","name":"Oceania"},"country":{"alpha_2":"AU","name":"Australia"},"subdivision":{"code":"AU-QLD","name":"Queensland","category":"state"},"latitude":{"average":-27.5,"stddev":0.5},"longitude":{"average":153.0,"stddev":0.5},"accuracy_radius":{"average":20.0},"time_zone":"Australia/Brisbane"}}"#,
    r#"{"protocol":6,"network":"2a03:2880::/29","location":{"continent":{"code":"EU","name":"Europe"},"country":{"alpha_2":"IE","name":"Ireland"},"latitude":{"average":53.25},"longitude":{"average":-6.25},"time_zone":"Europe/Dublin"}}"#,
];

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn city_database() -> Vec<u8> {
    let mut trie = Trie::with_options(
        TrieOptions::new(IpVersion::V6)
            .with_ipv4_aliasing(true)
            .with_description("en", "Test City database")
            .with_languages(["en"])
            .with_build_epoch(1_700_000_000),
    );
    for (i, line) in LINES.iter().enumerate() {
        let (network, record) = ingest::parse_line(line.as_bytes(), i as u64 + 1)
            .unwrap()
            .unwrap();
        trie.insert(network, record).unwrap();
    }
    trie.to_bytes().unwrap()
}

#[test]
fn test_records_readable() {
    let reader = maxminddb::Reader::from_source(city_database()).unwrap();

    let city: City = reader.lookup(ip("1.0.0.1")).unwrap();
    assert_eq!(
        city.country,
        Country {
            iso_code: "AU".to_string(),
            name: "Australia".to_string()
        }
    );
    assert_eq!(city.location.time_zone, "Australia/Brisbane");
    assert_eq!(city.location.latitude, -27.5);
    assert_eq!(
        city.subdivisions,
        vec![Subdivision {
            iso_code: "AU-QLD".to_string(),
            category: "state".to_string()
        }]
    );

    let city: City = reader.lookup(ip("2a03:2880:f003:c07:face:b00c::2")).unwrap();
    assert_eq!(city.country.iso_code, "IE");
    assert_eq!(city.location.longitude, -6.25);
    assert!(city.subdivisions.is_empty());
}

#[test]
fn test_aliases_readable() {
    let reader = maxminddb::Reader::from_source(city_database()).unwrap();

    for addr in ["::ffff:1.0.0.200", "2002:100:1::"] {
        let city: City = reader.lookup(ip(addr)).unwrap();
        assert_eq!(city.country.iso_code, "AU", "{}", addr);
    }
}

#[test]
fn test_missing_address() {
    let reader = maxminddb::Reader::from_source(city_database()).unwrap();
    assert!(reader.lookup::<City>(ip("8.8.8.8")).is_err());
    assert!(reader.lookup::<City>(ip("2001:4860::8888")).is_err());
}

#[test]
fn test_prefix_length() {
    let reader = maxminddb::Reader::from_source(city_database()).unwrap();
    let (_, prefix_len) = reader.lookup_prefix::<City>(ip("1.0.0.9")).unwrap();
    assert_eq!(prefix_len, 24);
    let (_, prefix_len) = reader.lookup_prefix::<City>(ip("2a03:2880::1")).unwrap();
    assert_eq!(prefix_len, 29);
}

#[test]
fn test_metadata_readable() {
    let bytes = city_database();
    let size = bytes.len();
    let reader = maxminddb::Reader::from_source(bytes).unwrap();
    let metadata = &reader.metadata;

    assert_eq!(metadata.binary_format_major_version, 2);
    assert_eq!(metadata.binary_format_minor_version, 0);
    assert_eq!(metadata.database_type, "City");
    assert_eq!(metadata.ip_version, 6);
    assert_eq!(metadata.build_epoch, 1_700_000_000);
    assert_eq!(metadata.languages, vec!["en".to_string()]);
    assert_eq!(
        metadata.description.get("en").map(String::as_str),
        Some("Test City database")
    );
    assert!(matches!(metadata.record_size, 24 | 28 | 32));
    assert!(size > 0);
}

#[test]
fn test_every_record_size_readable() {
    for record_size in RecordSize::ALL {
        let mut trie = Trie::with_options(
            TrieOptions::new(IpVersion::V4)
                .with_record_size(record_size)
                .with_build_epoch(0),
        );
        let mut expected = BTreeMap::new();
        for i in 0..200u32 {
            let addr = IpAddr::from([11, (i / 256) as u8, i as u8, 0]);
            let network = geoforge::Network::new(addr, 24).unwrap();
            let name = format!("net-{}", i);
            let record: DataValue = vec![("name", name.as_str())].into_iter().collect();
            trie.insert(network, record).unwrap();
            expected.insert(addr, name);
        }

        let reader = maxminddb::Reader::from_source(trie.to_bytes().unwrap()).unwrap();
        assert_eq!(reader.metadata.record_size, record_size as u16);
        for (addr, name) in &expected {
            let found: Named = reader.lookup(*addr).unwrap();
            assert_eq!(&found.name, name);
        }
    }
}
