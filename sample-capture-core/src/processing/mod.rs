pub mod level;
pub mod pcm;
pub mod trim;
pub mod wav_format;
