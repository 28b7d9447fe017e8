use std::fmt;

use forecast_core::WeatherData;

/// Plain-text rendering of today's conditions and the forecast list.
pub fn weather(data: &WeatherData, stale: bool) -> String {
    Forecast { data, stale }.to_string()
}

struct Forecast<'a> {
    data: &'a WeatherData,
    stale: bool,
}

impl fmt::Display for Forecast<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let today = self.data.today();

        if self.stale {
            writeln!(f, "(offline: showing last saved forecast)\n")?;
        }

        writeln!(f, "Today's Weather")?;
        writeln!(f, "Temperature: {}°C", today.temperature())?;
        writeln!(f, "Condition: {}", today.condition())?;
        writeln!(f, "Humidity: {}%", today.humidity())?;
        writeln!(f, "Wind Speed: {} km/h", today.wind_speed())?;

        writeln!(f, "\n7-Day Forecast")?;
        for day in self.data.weekly_forecast() {
            writeln!(
                f,
                "{}: {}°C - {}°C, {}",
                day.date(),
                day.min_temp(),
                day.max_temp(),
                day.description()
            )?;
        }

        Ok(())
    }
}
