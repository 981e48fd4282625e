//! Hinglish vocabulary normalization tests.

use astranote::parser::normalize::normalize;

#[test]
fn rewrites_relative_time_words() {
    assert_eq!(
        normalize("10 min baad meeting attend karna"),
        "10 minutes after meeting attend karna"
    );
    assert_eq!(normalize("2 ghante baad khaana"), "2 hours after khaana");
    assert_eq!(normalize("3 din baad rent"), "3 days after rent");
}

#[test]
fn rewrites_day_and_day_part_words() {
    assert_eq!(normalize("kal shaam 5 baje gym jana"), "tomorrow evening 5 baje gym jana");
    assert_eq!(normalize("aaj raat 10 baje"), "today night 10 baje");
    assert_eq!(normalize("parso subah yoga"), "day after tomorrow morning yoga");
    assert_eq!(normalize("kal dopahar lunch"), "tomorrow afternoon lunch");
}

#[test]
fn is_case_insensitive() {
    assert_eq!(normalize("KAL Shaam"), "tomorrow evening");
}

#[test]
fn leaves_words_that_merely_contain_vocabulary() {
    assert_eq!(normalize("kalpana ko minecraft"), "kalpana ko minecraft");
    assert_eq!(normalize("dinner at raatri"), "dinner at raatri");
}

#[test]
fn canonical_text_is_a_fixed_point() {
    for text in [
        "10 min baad meeting",
        "kal shaam 5 baje gym",
        "parso subah 9 baje yoga",
        "2 hafte baad dentist",
        "18:45 dinner with team",
    ] {
        let once = normalize(text);
        assert_eq!(normalize(&once), once, "{text}");
    }
}

#[test]
fn unmatched_text_only_changes_case_and_spacing() {
    assert_eq!(normalize("Call   Mom"), "call mom");
    assert_eq!(normalize(""), "");
}

#[test]
fn only_standard_spellings_are_rewritten() {
    assert_eq!(normalize("sham ko parson milna"), "sham ko parson milna");
    assert_eq!(normalize("parso shaam"), "day after tomorrow evening");
}
